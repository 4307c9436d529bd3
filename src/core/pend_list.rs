//! Priority-ordered pend list
//!
//! Every blockable kernel object (mutex, semaphore, queue, I/O driver)
//! keeps one of these per wait reason. Tasks are inserted in priority
//! order so the head is always the next task to be serviced; `flush`
//! walks the whole list at once to wake every waiter atomically (e.g. on
//! object deletion), without re-entering the scheduler mid-walk.

use core::ptr::NonNull;

use crate::task::OsTcb;
use crate::types::{task_flags, OsPendOn, OsPendStatus};

#[derive(Debug)]
pub struct PendList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
}

impl PendList {
    pub const fn new() -> Self {
        PendList { head: None, tail: None }
    }

    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline(always)]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Insert `tcb` ordered by descending priority (highest priority
    /// first — see `DESIGN.md` for the priority-direction convention).
    /// Ties at equal priority are broken LIFO: a newly inserted waiter is
    /// placed ahead of existing waiters at the same priority, so it is
    /// the next one served.
    pub fn insert_by_prio(&mut self, tcb: NonNull<OsTcb>) {
        let prio = unsafe { tcb.as_ref().prio };

        let mut current = self.head;
        let mut prev: Option<NonNull<OsTcb>> = None;

        while let Some(cur_ptr) = current {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            if prio >= cur_ref.prio {
                break;
            }
            prev = current;
            current = cur_ref.pend_next_ptr;
        }

        let tcb_mut = unsafe { &mut *tcb.as_ptr() };
        tcb_mut.pend_prev_ptr = prev;
        tcb_mut.pend_next_ptr = current;

        match prev {
            Some(p) => unsafe { (*p.as_ptr()).pend_next_ptr = Some(tcb) },
            None => self.head = Some(tcb),
        }

        match current {
            Some(c) => unsafe { (*c.as_ptr()).pend_prev_ptr = Some(tcb) },
            None => self.tail = Some(tcb),
        }
    }

    /// Insert `tcb` at the tail, FIFO order. Used by wait lists created
    /// without priority ordering (e.g. a FIFO-mode queue).
    pub fn insert_fifo(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_mut = unsafe { &mut *tcb.as_ptr() };
        tcb_mut.pend_next_ptr = None;
        tcb_mut.pend_prev_ptr = self.tail;

        match self.tail {
            Some(tail) => unsafe { (*tail.as_ptr()).pend_next_ptr = Some(tcb) },
            None => self.head = Some(tcb),
        }

        self.tail = Some(tcb);
    }

    /// Remove a specific TCB from the list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.pend_prev_ptr {
            Some(prev) => unsafe { (*prev.as_ptr()).pend_next_ptr = tcb_ref.pend_next_ptr },
            None => self.head = tcb_ref.pend_next_ptr,
        }

        match tcb_ref.pend_next_ptr {
            Some(next) => unsafe { (*next.as_ptr()).pend_prev_ptr = tcb_ref.pend_prev_ptr },
            None => self.tail = tcb_ref.pend_prev_ptr,
        }

        tcb_ref.pend_prev_ptr = None;
        tcb_ref.pend_next_ptr = None;
    }

    /// Wake every waiter at once with `OsPendStatus::Flush`, emptying the
    /// list. Returns the number of tasks woken. Callers are responsible
    /// for re-inserting each woken TCB into the ready list and for
    /// calling `schedule()` exactly once afterward, not per-waiter.
    pub fn flush<F: FnMut(NonNull<OsTcb>)>(&mut self, mut on_wake: F) -> usize {
        let mut count = 0;
        while let Some(tcb_ptr) = self.head {
            self.remove(tcb_ptr);
            let tcb = unsafe { &mut *tcb_ptr.as_ptr() };
            tcb.pend_on = OsPendOn::Nothing;
            tcb.pend_status = OsPendStatus::Flush;
            tcb.pend_obj_ptr = core::ptr::null_mut();
            tcb.flags |= task_flags::AWOKEN_BY_FLUSH;
            on_wake(tcb_ptr);
            count += 1;
        }
        count
    }
}

impl Default for PendList {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for PendList {}
unsafe impl Sync for PendList {}
