//! Message queue implementation
//!
//! A fixed-size circular buffer of fixed-size messages (byte-copy mode)
//! or of raw pointers (pointer mode). Two independent wait lists — put
//! and get — each either FIFO or priority-ordered depending on how the
//! queue was created.

use core::ptr::NonNull;

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::pend_list::PendList;
use crate::sched;
use crate::types::{opt, OsMsgSize, OsObjKind, OsOpt, OsPendOn, OsPendStatus, OsTaskState, OsTick};

/// Fixed-size circular-buffer message queue
pub struct OsQueue {
    obj_kind: OsObjKind,
    /// Backing storage, `capacity * elem_size` bytes, owned by the caller
    buf: *mut u8,
    elem_size: usize,
    capacity: usize,
    head: usize,
    tail: usize,
    used: usize,
    priority_ordered: bool,
    /// `true` if created with `opt::QUEUE_POINTER`: the ring buffer holds
    /// raw pointer values (`*mut ()`) rather than byte-copied messages,
    /// and `put`/`get` are replaced by `put_ptr`/`get_ptr`.
    pointer_mode: bool,
    put_list: PendList,
    get_list: PendList,
    #[cfg(feature = "defmt")]
    name: &'static str,
}

// SAFETY: all access to `buf` happens under the kernel's single global
// critical section, same as every other sync primitive here.
unsafe impl Send for OsQueue {}
unsafe impl Sync for OsQueue {}

impl OsQueue {
    pub const fn new() -> Self {
        OsQueue {
            obj_kind: OsObjKind::Queue,
            buf: core::ptr::null_mut(),
            elem_size: 0,
            capacity: 0,
            head: 0,
            tail: 0,
            used: 0,
            priority_ordered: false,
            pointer_mode: false,
            put_list: PendList::new(),
            get_list: PendList::new(),
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the queue over caller-supplied storage.
    ///
    /// # Safety
    /// `buf` must point to at least `elem_size * capacity` bytes, valid
    /// and exclusively owned by this queue for its entire lifetime.
    pub unsafe fn create(
        &mut self,
        buf: *mut u8,
        elem_size: usize,
        capacity: usize,
        create_opt: OsOpt,
        _name: &'static str,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        if elem_size == 0 || capacity == 0 {
            return Err(OsError::OptInvalid);
        }
        let pointer_mode = create_opt & opt::QUEUE_POINTER != 0;
        if pointer_mode && elem_size != core::mem::size_of::<*mut ()>() {
            return Err(OsError::OptInvalid);
        }

        critical_section(|_cs| {
            self.obj_kind = OsObjKind::Queue;
            self.buf = buf;
            self.elem_size = elem_size;
            self.capacity = capacity;
            self.head = 0;
            self.tail = 0;
            self.used = 0;
            self.priority_ordered = create_opt & opt::QUEUE_PRIO != 0;
            self.pointer_mode = pointer_mode;
            self.put_list.init();
            self.get_list.init();
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Enqueue `data` (`elem_size` bytes), blocking up to `timeout` ticks
    /// if full, re-checking capacity after every wake since a waking
    /// event only means "room was freed", not "room reserved for you".
    pub fn put(&mut self, data: *const u8, size: OsMsgSize, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        if self.obj_kind != OsObjKind::Queue {
            return Err(OsError::ObjType);
        }
        if self.pointer_mode {
            return Err(OsError::OptInvalid);
        }
        if size != self.elem_size {
            return Err(OsError::QMsgSize);
        }

        critical_section(|_cs| loop {
            if self.used < self.capacity {
                unsafe {
                    let dst = self.buf.add(self.tail * self.elem_size);
                    core::ptr::copy_nonoverlapping(data, dst, self.elem_size);
                }
                self.tail = (self.tail + 1) % self.capacity;
                self.used += 1;
                self.wake_one_getter(pend_opt);
                return Ok(());
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::QFull);
            }
            if is_isr_context() {
                return Err(OsError::PendIsr);
            }
            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            self.block_on(cur_tcb_ptr, OsPendOn::QueuePut, timeout, true);

            match unsafe { cur_tcb_ptr.as_ref().pend_status } {
                OsPendStatus::Ok => continue,
                OsPendStatus::Timeout => return Err(OsError::Timeout),
                OsPendStatus::Flush => return Err(OsError::PendDel),
                OsPendStatus::Del => return Err(OsError::ObjDel),
                OsPendStatus::Abort => return Err(OsError::PendAbort),
            }
        })
    }

    /// Dequeue into `out` (`elem_size` bytes), blocking up to `timeout`
    /// ticks if empty.
    pub fn get(&mut self, out: *mut u8, out_size: OsMsgSize, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        if self.obj_kind != OsObjKind::Queue {
            return Err(OsError::ObjType);
        }
        if self.pointer_mode {
            return Err(OsError::OptInvalid);
        }
        if out_size != self.elem_size {
            return Err(OsError::QMsgSize);
        }

        critical_section(|_cs| loop {
            if self.used > 0 {
                unsafe {
                    let src = self.buf.add(self.head * self.elem_size);
                    core::ptr::copy_nonoverlapping(src, out, self.elem_size);
                }
                self.head = (self.head + 1) % self.capacity;
                self.used -= 1;
                self.wake_one_putter(pend_opt);
                return Ok(());
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::QEmpty);
            }
            if is_isr_context() {
                return Err(OsError::PendIsr);
            }
            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            self.block_on(cur_tcb_ptr, OsPendOn::QueueGet, timeout, false);

            match unsafe { cur_tcb_ptr.as_ref().pend_status } {
                OsPendStatus::Ok => continue,
                OsPendStatus::Timeout => return Err(OsError::Timeout),
                OsPendStatus::Flush => return Err(OsError::PendDel),
                OsPendStatus::Del => return Err(OsError::ObjDel),
                OsPendStatus::Abort => return Err(OsError::PendAbort),
            }
        })
    }

    /// Enqueue a raw pointer into a `QUEUE_POINTER` queue. The pointer
    /// itself is stored in the ring slot, not the bytes behind it.
    pub fn put_ptr(&mut self, ptr: *mut (), timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        if self.obj_kind != OsObjKind::Queue {
            return Err(OsError::ObjType);
        }
        if !self.pointer_mode {
            return Err(OsError::OptInvalid);
        }

        critical_section(|_cs| loop {
            if self.used < self.capacity {
                unsafe {
                    let dst = self.buf.add(self.tail * self.elem_size) as *mut *mut ();
                    dst.write(ptr);
                }
                self.tail = (self.tail + 1) % self.capacity;
                self.used += 1;
                self.wake_one_getter(pend_opt);
                return Ok(());
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::QFull);
            }
            if is_isr_context() {
                return Err(OsError::PendIsr);
            }
            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            self.block_on(cur_tcb_ptr, OsPendOn::QueuePut, timeout, true);

            match unsafe { cur_tcb_ptr.as_ref().pend_status } {
                OsPendStatus::Ok => continue,
                OsPendStatus::Timeout => return Err(OsError::Timeout),
                OsPendStatus::Flush => return Err(OsError::PendDel),
                OsPendStatus::Del => return Err(OsError::ObjDel),
                OsPendStatus::Abort => return Err(OsError::PendAbort),
            }
        })
    }

    /// Dequeue a raw pointer from a `QUEUE_POINTER` queue.
    pub fn get_ptr(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<*mut ()> {
        if self.obj_kind != OsObjKind::Queue {
            return Err(OsError::ObjType);
        }
        if !self.pointer_mode {
            return Err(OsError::OptInvalid);
        }

        critical_section(|_cs| loop {
            if self.used > 0 {
                let ptr = unsafe {
                    let src = self.buf.add(self.head * self.elem_size) as *const *mut ();
                    src.read()
                };
                self.head = (self.head + 1) % self.capacity;
                self.used -= 1;
                self.wake_one_putter(pend_opt);
                return Ok(ptr);
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::QEmpty);
            }
            if is_isr_context() {
                return Err(OsError::PendIsr);
            }
            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            self.block_on(cur_tcb_ptr, OsPendOn::QueueGet, timeout, false);

            match unsafe { cur_tcb_ptr.as_ref().pend_status } {
                OsPendStatus::Ok => continue,
                OsPendStatus::Timeout => return Err(OsError::Timeout),
                OsPendStatus::Flush => return Err(OsError::PendDel),
                OsPendStatus::Del => return Err(OsError::ObjDel),
                OsPendStatus::Abort => return Err(OsError::PendAbort),
            }
        })
    }

    /// Address of the next readable element without removing it. Only
    /// valid until the next `get`/`purge` on this queue.
    pub fn peek(&self) -> OsResult<*const u8> {
        if self.obj_kind != OsObjKind::Queue {
            return Err(OsError::ObjType);
        }
        if self.used == 0 {
            return Err(OsError::QEmpty);
        }
        Ok(unsafe { self.buf.add(self.head * self.elem_size) as *const u8 })
    }

    /// Drop the oldest message without copying it out.
    pub fn purge(&mut self) -> OsResult<()> {
        if self.obj_kind != OsObjKind::Queue {
            return Err(OsError::ObjType);
        }
        critical_section(|_cs| {
            if self.used == 0 {
                return Err(OsError::QEmpty);
            }
            self.head = (self.head + 1) % self.capacity;
            self.used -= 1;
            Ok(())
        })
    }

    /// Delete the queue, waking every put- and get-waiter with
    /// `OsPendStatus::Flush`.
    pub fn del(&mut self, del_opt: OsOpt) -> OsResult<usize> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }
        if self.obj_kind != OsObjKind::Queue {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            let mut woken = self.put_list.flush(|tcb_ptr| unsafe {
                let tcb = &mut *tcb_ptr.as_ptr();
                if tcb.on_delta_list() {
                    kernel::delayed_list().remove(tcb_ptr);
                }
                tcb.task_state = OsTaskState::Ready;
                sched::os_rdy_list_insert(tcb_ptr);
            });
            woken += self.get_list.flush(|tcb_ptr| unsafe {
                let tcb = &mut *tcb_ptr.as_ptr();
                if tcb.on_delta_list() {
                    kernel::delayed_list().remove(tcb_ptr);
                }
                tcb.task_state = OsTaskState::Ready;
                sched::os_rdy_list_insert(tcb_ptr);
            });

            self.head = 0;
            self.tail = 0;
            self.used = 0;

            if woken > 0 && del_opt & opt::POST_NO_SCHED == 0 {
                sched::os_sched();
            }

            Ok(woken)
        })
    }

    #[inline]
    pub fn get_count(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The put or get wait list, selected by which side `pend_on` names.
    /// Used by `core::unlink` to pull a timed-out waiter back out.
    pub(crate) fn pend_list_mut(&mut self, pend_on: OsPendOn) -> &mut PendList {
        match pend_on {
            OsPendOn::QueuePut => &mut self.put_list,
            _ => &mut self.get_list,
        }
    }

    /// Whether this queue's wait lists are priority-ordered rather than
    /// FIFO. Used by `sync::mutex::propagate` to decide whether a boosted
    /// owner waiting on this queue needs repositioning.
    #[inline]
    pub(crate) fn is_priority_ordered(&self) -> bool {
        self.priority_ordered
    }

    fn wake_one_getter(&mut self, pend_opt: OsOpt) {
        if let Some(getter_ptr) = self.get_list.head() {
            self.get_list.remove(getter_ptr);
            unblock(getter_ptr);
            if pend_opt & opt::POST_NO_SCHED == 0 && !is_isr_context() {
                sched::os_sched();
            }
        }
    }

    fn wake_one_putter(&mut self, pend_opt: OsOpt) {
        if let Some(putter_ptr) = self.put_list.head() {
            self.put_list.remove(putter_ptr);
            unblock(putter_ptr);
            if pend_opt & opt::POST_NO_SCHED == 0 && !is_isr_context() {
                sched::os_sched();
            }
        }
    }

    /// Park the current task on the put or get list, with an optional
    /// timeout, and run the scheduler.
    fn block_on(
        &mut self,
        cur_tcb_ptr: NonNull<OsTcb>,
        pend_on: OsPendOn,
        timeout: OsTick,
        is_put: bool,
    ) {
        unsafe {
            let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

            sched::os_rdy_list_remove(cur_tcb_ptr);

            cur_tcb.pend_on = pend_on;
            cur_tcb.pend_status = OsPendStatus::Ok;
            cur_tcb.pend_obj_ptr = self as *mut _ as *mut ();
            cur_tcb.task_state = OsTaskState::QueueWait;

            let priority_ordered = self.priority_ordered;
            let list = if is_put { &mut self.put_list } else { &mut self.get_list };
            if priority_ordered {
                list.insert_by_prio(cur_tcb_ptr);
            } else {
                list.insert_fifo(cur_tcb_ptr);
            }

            if timeout > 0 {
                kernel::delayed_list().insert(cur_tcb_ptr, timeout);
            }
        }

        sched::os_sched();

        unsafe {
            let cur_tcb = &mut *cur_tcb_ptr.as_ptr();
            if cur_tcb.on_delta_list() {
                kernel::delayed_list().remove(cur_tcb_ptr);
            }
        }
    }
}

use crate::task::OsTcb;

/// Move a woken waiter back onto the ready list.
fn unblock(tcb_ptr: NonNull<OsTcb>) {
    let tcb = unsafe { &mut *tcb_ptr.as_ptr() };
    if tcb.on_delta_list() {
        unsafe { kernel::delayed_list().remove(tcb_ptr) };
    }
    tcb.pend_on = OsPendOn::Nothing;
    tcb.pend_status = OsPendStatus::Ok;
    tcb.pend_obj_ptr = core::ptr::null_mut();
    tcb.task_state = OsTaskState::Ready;
    unsafe { sched::os_rdy_list_insert(tcb_ptr) };
}

impl Default for OsQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Safe wrapper over [`OsQueue`] for `static` declarations, e.g.
/// `static MY_Q: Queue = Queue::new();`. The backing storage is still
/// supplied separately via `create`, same as the raw type.
pub struct Queue {
    inner: UnsafeCell<OsQueue>,
}

unsafe impl Sync for Queue {}
unsafe impl Send for Queue {}

impl Queue {
    pub const fn new() -> Self {
        Queue {
            inner: UnsafeCell::new(OsQueue::new()),
        }
    }

    /// # Safety
    /// Same as [`OsQueue::create`]: `buf` must point to at least
    /// `elem_size * capacity` bytes, valid and exclusively owned by this
    /// queue for its entire lifetime.
    pub unsafe fn create(
        &self,
        buf: *mut u8,
        elem_size: usize,
        capacity: usize,
        create_opt: OsOpt,
        name: &'static str,
    ) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(buf, elem_size, capacity, create_opt, name) }
    }

    pub fn put(&self, data: *const u8, size: OsMsgSize, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).put(data, size, timeout, pend_opt) }
    }

    pub fn get(&self, out: *mut u8, out_size: OsMsgSize, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).get(out, out_size, timeout, pend_opt) }
    }

    pub fn put_ptr(&self, ptr: *mut (), timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).put_ptr(ptr, timeout, pend_opt) }
    }

    pub fn get_ptr(&self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<*mut ()> {
        unsafe { (*self.inner.get()).get_ptr(timeout, pend_opt) }
    }

    pub fn peek(&self) -> OsResult<*const u8> {
        unsafe { (*self.inner.get()).peek() }
    }

    pub fn purge(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).purge() }
    }

    pub fn del(&self, del_opt: OsOpt) -> OsResult<usize> {
        unsafe { (*self.inner.get()).del(del_opt) }
    }

    #[inline]
    pub fn get_count(&self) -> usize {
        unsafe { (*self.inner.get()).get_count() }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        unsafe { (*self.inner.get()).capacity() }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}
