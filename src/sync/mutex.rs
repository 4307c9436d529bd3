//! Mutex implementation with priority inheritance
//!
//! Mutexes provide mutual exclusion with automatic priority boosting to
//! prevent priority inversion. Boosting is not a single hop: if the owner
//! is itself blocked on another mutex, the boost walks the chain of
//! owners until it reaches a task that isn't blocked, re-sorting each
//! intermediate mutex's wait list as it goes so the chain stays
//! priority-ordered.

use core::ptr::NonNull;

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::pend_list::PendList;
use crate::sched;
use crate::sync::queue::OsQueue;
use crate::sync::sem::OsSem;
use crate::task::OsTcb;
use crate::types::{
    opt, OsNestingCtr, OsObjKind, OsOpt, OsPendOn, OsPendStatus, OsPrio, OsTaskState, OsTick,
};

/// Mutex with priority inheritance
pub struct OsMutex {
    /// Object kind marker, checked on every call against accidental misuse
    obj_kind: OsObjKind,
    /// List of tasks waiting on this mutex, ordered highest priority first
    pend_list: PendList,
    /// Task that owns the mutex
    owner: Option<NonNull<OsTcb>>,
    /// Nesting counter
    nesting_ctr: OsNestingCtr,
    /// Links in the owner's intrusive list of currently-held mutexes
    owned_next: Option<NonNull<OsMutex>>,
    owned_prev: Option<NonNull<OsMutex>>,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsMutex {
    /// Create a new mutex
    pub const fn new() -> Self {
        OsMutex {
            obj_kind: OsObjKind::Mutex,
            pend_list: PendList::new(),
            owner: None,
            nesting_ctr: 0,
            owned_next: None,
            owned_prev: None,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the mutex
    pub fn create(&mut self, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            self.obj_kind = OsObjKind::Mutex;
            self.pend_list.init();
            self.owner = None;
            self.nesting_ctr = 0;
            self.owned_next = None;
            self.owned_prev = None;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Acquire the mutex
    ///
    /// If the mutex is owned by a lower-priority task, the owner's
    /// priority (and, transitively, every owner further up the chain of
    /// mutexes it is itself blocked on) is boosted to prevent priority
    /// inversion.
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait, 0 waits forever
    /// * `pend_opt` - Pend options
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_kind != OsObjKind::Mutex {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            let self_ptr: NonNull<OsMutex> = NonNull::from(&mut *self);

            if self.owner.is_none() {
                self.owner = Some(cur_tcb_ptr);
                self.nesting_ctr = 1;
                unsafe { owned_push(&mut *cur_tcb_ptr.as_ptr(), self_ptr) };
                return Ok(());
            }

            // Already owns it — recursive lock
            if self.owner == Some(cur_tcb_ptr) {
                if self.nesting_ctr == OsNestingCtr::MAX {
                    return Err(OsError::MutexOvf);
                }
                self.nesting_ctr += 1;
                return Ok(());
            }

            // Owned by another task
            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            unsafe {
                let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                sched::os_rdy_list_remove(cur_tcb_ptr);

                cur_tcb.pend_on = OsPendOn::Mutex;
                cur_tcb.pend_status = OsPendStatus::Ok;
                cur_tcb.pend_obj_ptr = self_ptr.as_ptr() as *mut ();
                cur_tcb.task_state = OsTaskState::MutexWait;

                self.pend_list.insert_by_prio(cur_tcb_ptr);

                if timeout > 0 {
                    kernel::delayed_list().insert(cur_tcb_ptr, timeout);
                }

                propagate(self_ptr);
            }

            sched::os_sched();

            unsafe {
                let cur_tcb = &mut *cur_tcb_ptr.as_ptr();
                if cur_tcb.on_delta_list() {
                    kernel::delayed_list().remove(cur_tcb_ptr);
                }
                match cur_tcb.pend_status {
                    OsPendStatus::Ok => Ok(()),
                    OsPendStatus::Timeout => Err(OsError::Timeout),
                    OsPendStatus::Flush => Err(OsError::PendDel),
                    OsPendStatus::Del => Err(OsError::ObjDel),
                    OsPendStatus::Abort => Err(OsError::PendAbort),
                }
            }
        })
    }

    /// Release the mutex
    ///
    /// If the current task's priority was boosted, it is recomputed from
    /// every mutex it still holds (not just reset to its base priority —
    /// a task can be boosted by more than one mutex at once).
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::AcceptIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_kind != OsObjKind::Mutex {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

            if self.owner != Some(cur_tcb_ptr) {
                return Err(OsError::MutexNotOwner);
            }

            if self.nesting_ctr > 1 {
                self.nesting_ctr -= 1;
                return Ok(());
            }

            self.nesting_ctr = 0;
            let self_ptr: NonNull<OsMutex> = NonNull::from(&mut *self);

            unsafe { owned_remove(&mut *cur_tcb_ptr.as_ptr(), self_ptr) };

            let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };
            let new_prio = recompute_inherited_prio(cur_tcb);
            if new_prio != cur_tcb.prio {
                if cur_tcb.task_state == OsTaskState::Ready {
                    unsafe { sched::os_rdy_list_change_prio(cur_tcb_ptr, new_prio) };
                } else {
                    cur_tcb.prio = new_prio;
                }
            }

            if let Some(waiter_ptr) = self.pend_list.head() {
                self.pend_list.remove(waiter_ptr);
                let waiter = unsafe { &mut *waiter_ptr.as_ptr() };

                if waiter.on_delta_list() {
                    unsafe { kernel::delayed_list().remove(waiter_ptr) };
                }

                waiter.pend_on = OsPendOn::Nothing;
                waiter.pend_status = OsPendStatus::Ok;
                waiter.pend_obj_ptr = core::ptr::null_mut();
                waiter.task_state = OsTaskState::Ready;

                self.owner = Some(waiter_ptr);
                self.nesting_ctr = 1;
                unsafe { owned_push(waiter, self_ptr) };

                unsafe { sched::os_rdy_list_insert(waiter_ptr) };

                if post_opt & opt::POST_NO_SCHED == 0 {
                    sched::os_sched();
                }
            } else {
                self.owner = None;
            }

            Ok(())
        })
    }

    /// Delete the mutex, waking every waiter with `PendStatus::Del`.
    ///
    /// Refuses to delete a mutex with waiters unless `opt::DEL_ALWAYS` is
    /// set, since woken waiters will observe `OsError::ObjDel` rather
    /// than getting the mutex.
    pub fn del(&mut self, del_opt: OsOpt) -> OsResult<usize> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }

        if self.obj_kind != OsObjKind::Mutex {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if !self.pend_list.is_empty() && del_opt & opt::DEL_ALWAYS == 0 {
                return Err(OsError::StateInvalid);
            }

            let self_ptr: NonNull<OsMutex> = NonNull::from(&mut *self);

            if let Some(owner_ptr) = self.owner.take() {
                unsafe {
                    owned_remove(&mut *owner_ptr.as_ptr(), self_ptr);
                    let owner = &mut *owner_ptr.as_ptr();
                    let new_prio = recompute_inherited_prio(owner);
                    if new_prio != owner.prio {
                        if owner.task_state == OsTaskState::Ready {
                            sched::os_rdy_list_change_prio(owner_ptr, new_prio);
                        } else {
                            owner.prio = new_prio;
                        }
                    }
                }
            }

            self.nesting_ctr = 0;

            let woken = self.pend_list.flush(|tcb_ptr| unsafe {
                let tcb = &mut *tcb_ptr.as_ptr();
                if tcb.on_delta_list() {
                    kernel::delayed_list().remove(tcb_ptr);
                }
                tcb.task_state = OsTaskState::Ready;
                sched::os_rdy_list_insert(tcb_ptr);
            });

            if woken > 0 && del_opt & opt::POST_NO_SCHED == 0 {
                sched::os_sched();
            }

            Ok(woken)
        })
    }

    /// Check if mutex is owned
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Get owner's current (possibly boosted) priority
    pub fn owner_prio(&self) -> Option<OsPrio> {
        self.owner.map(|ptr| unsafe { ptr.as_ref().prio })
    }

    /// Current owner, if any. Used by `core::unlink` to recompute the
    /// owner's inherited priority after a waiter leaves via timeout.
    #[inline]
    pub(crate) fn owner(&self) -> Option<NonNull<OsTcb>> {
        self.owner
    }

    #[inline]
    pub(crate) fn pend_list_mut(&mut self) -> &mut PendList {
        &mut self.pend_list
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Push `mutex` onto `tcb`'s intrusive list of currently-owned mutexes.
///
/// # Safety
/// `tcb` and `mutex` must be valid and `mutex` must not already be linked
/// into any owned list.
unsafe fn owned_push(tcb: &mut OsTcb, mut mutex: NonNull<OsMutex>) {
    unsafe {
        mutex.as_mut().owned_prev = None;
        mutex.as_mut().owned_next = tcb.mutex_owned_head;
    }
    if let Some(mut old_head) = tcb.mutex_owned_head {
        unsafe { old_head.as_mut().owned_prev = Some(mutex) };
    }
    tcb.mutex_owned_head = Some(mutex);
}

/// Remove `mutex` from `tcb`'s intrusive list of currently-owned mutexes.
///
/// # Safety
/// `tcb` and `mutex` must be valid and `mutex` must currently be linked
/// into `tcb`'s owned list.
unsafe fn owned_remove(tcb: &mut OsTcb, mut mutex: NonNull<OsMutex>) {
    let (prev, next) = unsafe { (mutex.as_ref().owned_prev, mutex.as_ref().owned_next) };

    match prev {
        Some(mut p) => unsafe { p.as_mut().owned_next = next },
        None => tcb.mutex_owned_head = next,
    }
    if let Some(mut n) = next {
        unsafe { n.as_mut().owned_prev = prev };
    }

    unsafe {
        mutex.as_mut().owned_next = None;
        mutex.as_mut().owned_prev = None;
    }
}

/// Recompute a task's effective priority as the highest of its base
/// priority and the highest-priority waiter on any mutex it currently
/// owns.
fn recompute_inherited_prio(tcb: &OsTcb) -> OsPrio {
    let mut highest = tcb.base_prio;
    let mut cur = tcb.mutex_owned_head;

    while let Some(m_ptr) = cur {
        let m = unsafe { m_ptr.as_ref() };
        if let Some(w) = m.pend_list.head() {
            let waiter_prio = unsafe { w.as_ref().prio };
            if waiter_prio > highest {
                highest = waiter_prio;
            }
        }
        cur = m.owned_next;
    }

    highest
}

/// Recompute and apply `owner`'s inherited priority from its owned-mutex
/// set. Used when a waiter leaves a mutex's pend list by a path other than
/// `post` (currently: timeout, see `core::unlink`).
///
/// # Safety
/// `owner` must be a valid, currently-scheduled TCB pointer.
pub(crate) unsafe fn recompute_owner_prio(owner: NonNull<OsTcb>) {
    let owner_ref = unsafe { &mut *owner.as_ptr() };
    let new_prio = recompute_inherited_prio(owner_ref);
    if new_prio != owner_ref.prio {
        if owner_ref.task_state == OsTaskState::Ready {
            unsafe { sched::os_rdy_list_change_prio(owner, new_prio) };
        } else {
            owner_ref.prio = new_prio;
        }
    }
}

/// Walk the chain of mutex owners starting at `mutex_ptr`, boosting each
/// owner's priority to the highest waiter's priority on the mutex it
/// owns, and continuing up the chain if that owner is itself blocked on
/// another mutex.
///
/// # Safety
/// `mutex_ptr` must point to a valid, currently-owned mutex.
unsafe fn propagate(mut mutex_ptr: NonNull<OsMutex>) {
    loop {
        let mutex = unsafe { &mut *mutex_ptr.as_ptr() };

        let Some(owner_ptr) = mutex.owner else { return };
        let Some(head_waiter) = mutex.pend_list.head() else { return };
        let waiter_prio = unsafe { head_waiter.as_ref().prio };
        let owner = unsafe { &mut *owner_ptr.as_ptr() };

        if waiter_prio <= owner.prio {
            return;
        }

        if owner.task_state == OsTaskState::Ready {
            unsafe { sched::os_rdy_list_change_prio(owner_ptr, waiter_prio) };
        } else {
            owner.prio = waiter_prio;
        }

        if owner.task_state == OsTaskState::MutexWait && !owner.pend_obj_ptr.is_null() {
            let next_mutex_ptr = owner.pend_obj_ptr as *mut OsMutex;
            let next_mutex = unsafe { &mut *next_mutex_ptr };

            next_mutex.pend_list.remove(owner_ptr);
            next_mutex.pend_list.insert_by_prio(owner_ptr);

            mutex_ptr = unsafe { NonNull::new_unchecked(next_mutex_ptr) };
            continue;
        }

        // The owner isn't blocked on another mutex, so the boost doesn't
        // propagate any further up an ownership chain — but if it is
        // itself parked in another priority-ordered wait list, its new
        // priority has to move it to the right spot in that list too.
        if owner.task_state == OsTaskState::SemWait && !owner.pend_obj_ptr.is_null() {
            let sem = unsafe { &mut *(owner.pend_obj_ptr as *mut OsSem) };
            let list = sem.pend_list_mut();
            list.remove(owner_ptr);
            list.insert_by_prio(owner_ptr);
        } else if owner.task_state == OsTaskState::QueueWait && !owner.pend_obj_ptr.is_null() {
            let queue = unsafe { &mut *(owner.pend_obj_ptr as *mut OsQueue) };
            if queue.is_priority_ordered() {
                let list = queue.pend_list_mut(owner.pend_on);
                list.remove(owner_ptr);
                list.insert_by_prio(owner_ptr);
            }
        }

        return;
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct Mutex {
    inner: UnsafeCell<OsMutex>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::new()),
        }
    }

    pub fn create(&self, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(name) }
    }

    pub fn lock(&self, timeout: OsTick, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).pend(timeout, opt) }
    }

    pub fn unlock(&self, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).post(opt) }
    }

    pub fn delete(&self, opt: OsOpt) -> OsResult<usize> {
        unsafe { (*self.inner.get()).del(opt) }
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        unsafe { (*self.inner.get()).is_owned() }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
