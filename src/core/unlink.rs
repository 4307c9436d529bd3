//! Unified "task is done waiting" helper
//!
//! The delta list only knows how to expire a timeout; when the timeout
//! belongs to a task also linked into a mutex/semaphore/queue pend list,
//! that list has to be unwound too, and a mutex's owner may need its
//! inherited priority dropped. This is the one place that knows how to do
//! that for every wait kind, so the tick handler doesn't have to.

use core::ptr::NonNull;

use crate::io::OsIoDesc;
use crate::sched;
use crate::sync::mutex::{self, OsMutex};
use crate::sync::queue::OsQueue;
use crate::sync::sem::OsSem;
use crate::task::OsTcb;
use crate::types::{task_flags, OsPendOn, OsPendStatus, OsTaskState};

/// Finish waking `tcb`: unlink it from whatever pend list its `pend_on`
/// names, stamp `status`, and move it to Ready — or to Suspended, if a
/// suspend was requested while it was blocked.
///
/// # Safety
/// `tcb` must currently be linked into the pend list its `pend_on` field
/// names (a no-op on the list side when `pend_on == Nothing`).
pub unsafe fn finish_wait(tcb: NonNull<OsTcb>, status: OsPendStatus) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    match tcb_ref.pend_on {
        OsPendOn::Mutex => unsafe {
            let mutex = &mut *(tcb_ref.pend_obj_ptr as *mut OsMutex);
            mutex.pend_list_mut().remove(tcb);
            if let Some(owner) = mutex.owner() {
                mutex::recompute_owner_prio(owner);
            }
        },
        OsPendOn::Semaphore => unsafe {
            let sem = &mut *(tcb_ref.pend_obj_ptr as *mut OsSem);
            sem.pend_list_mut().remove(tcb);
        },
        OsPendOn::QueuePut | OsPendOn::QueueGet => unsafe {
            let queue = &mut *(tcb_ref.pend_obj_ptr as *mut OsQueue);
            queue.pend_list_mut(tcb_ref.pend_on).remove(tcb);
        },
        OsPendOn::Io => unsafe {
            let desc = &mut *(tcb_ref.pend_obj_ptr as *mut OsIoDesc);
            desc.pend_list_mut().remove(tcb);
        },
        OsPendOn::Signal | OsPendOn::Nothing => {}
    }

    tcb_ref.pend_on = OsPendOn::Nothing;
    tcb_ref.pend_status = status;
    tcb_ref.pend_obj_ptr = core::ptr::null_mut();

    if tcb_ref.flags & task_flags::SUSPEND_REQUESTED != 0 {
        tcb_ref.task_state = OsTaskState::Suspended;
        return;
    }

    tcb_ref.task_state = OsTaskState::Ready;
    if status == OsPendStatus::Timeout {
        tcb_ref.flags |= task_flags::AWOKEN_BY_TIMEOUT;
    }
    unsafe { sched::os_rdy_list_insert(tcb) };
}

/// Unlink `tcb` from whatever pend list its `pend_on` names, same as the
/// first half of [`finish_wait`], but leave `task_state`/delta-list
/// membership untouched — used by task deletion, which decides the final
/// state itself instead of going to Ready/Suspended.
///
/// # Safety
/// Same as `finish_wait`.
pub unsafe fn unlink_pend_only(tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    match tcb_ref.pend_on {
        OsPendOn::Mutex => unsafe {
            let mutex = &mut *(tcb_ref.pend_obj_ptr as *mut OsMutex);
            mutex.pend_list_mut().remove(tcb);
            if let Some(owner) = mutex.owner() {
                mutex::recompute_owner_prio(owner);
            }
        },
        OsPendOn::Semaphore => unsafe {
            let sem = &mut *(tcb_ref.pend_obj_ptr as *mut OsSem);
            sem.pend_list_mut().remove(tcb);
        },
        OsPendOn::QueuePut | OsPendOn::QueueGet => unsafe {
            let queue = &mut *(tcb_ref.pend_obj_ptr as *mut OsQueue);
            queue.pend_list_mut(tcb_ref.pend_on).remove(tcb);
        },
        OsPendOn::Io => unsafe {
            let desc = &mut *(tcb_ref.pend_obj_ptr as *mut OsIoDesc);
            desc.pend_list_mut().remove(tcb);
        },
        OsPendOn::Signal | OsPendOn::Nothing => {}
    }

    tcb_ref.pend_on = OsPendOn::Nothing;
    tcb_ref.pend_obj_ptr = core::ptr::null_mut();
    tcb_ref.pend_status = OsPendStatus::Del;
}
