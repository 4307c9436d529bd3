//! Time management module
//!
//! Provides tick handling, time delays, and timeout management, driven by
//! the delta-encoded delayed-task list in `kernel::delayed_list()`.

pub mod delta_list;
pub mod stretch;

use core::ptr::NonNull;

use crate::config::CFG_TICK_RATE_HZ;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task::OsTcb;
use crate::timer;
use crate::types::{task_flags, OsPendStatus, OsTaskState, OsTick};
use crate::unlink;

/// Time delay in ticks
///
/// Delays the calling task for the specified number of system ticks. The
/// task is removed from the ready list and placed on the delayed list.
/// When the delay expires, the tick handler moves the task back to ready
/// (or to suspended, if a suspend came in while it slept).
///
/// # Arguments
/// * `ticks` - Number of ticks to delay (0 = no delay)
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    if ticks == 0 {
        return Ok(());
    }

    critical_section(|_cs| {
        unsafe {
            if let Some(cur_tcb) = kernel::tcb_cur_ptr() {
                let tcb = &mut *cur_tcb.as_ptr();

                sched::os_rdy_list_remove(cur_tcb);
                tcb.task_state = OsTaskState::Delayed;
                kernel::delayed_list().insert(cur_tcb, ticks);
            }
        }
    });

    sched::os_sched();

    Ok(())
}

/// Time delay in hours, minutes, seconds, milliseconds
pub fn os_time_dly_hmsm(
    hours: u16,
    minutes: u8,
    seconds: u8,
    milliseconds: u16,
) -> OsResult<()> {
    if minutes > 59 {
        return Err(OsError::StateInvalid);
    }
    if seconds > 59 {
        return Err(OsError::StateInvalid);
    }
    if milliseconds > 999 {
        return Err(OsError::StateInvalid);
    }

    let total_ms = (hours as u32) * 3_600_000
        + (minutes as u32) * 60_000
        + (seconds as u32) * 1000
        + (milliseconds as u32);

    let ticks = (total_ms * CFG_TICK_RATE_HZ) / 1000;

    os_time_dly(ticks)
}

/// Resume a delayed task before its delay expires. Only valid for a task
/// sleeping on a plain delay (not pending on a sync object with a
/// timeout) — use the object's own abort/flush for that.
pub fn os_time_dly_resume(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if tcb_ref.task_state != OsTaskState::Delayed {
            return Err(OsError::TaskNotDly);
        }

        unsafe {
            kernel::delayed_list().remove(tcb);
            tcb_ref.task_state = OsTaskState::Ready;
            if tcb_ref.flags & task_flags::SUSPEND_REQUESTED != 0 {
                tcb_ref.task_state = OsTaskState::Suspended;
            } else {
                sched::os_rdy_list_insert(tcb);
            }
        }

        sched::os_sched();

        Ok(())
    })
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// Tick handler
///
/// Normally represents a single tick; after a tick-stretch sleep (see
/// `stretch`), `elapsed` may be several ticks replayed at once.
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    kernel::KERNEL.int_enter();

    let elapsed = kernel::take_pending_ticks();
    kernel::KERNEL.tick_increment(elapsed);

    critical_section(|_cs| {
        process_delayed_tasks(elapsed);
        sched::os_sched_round_robin();
    });

    timer::process_timers(elapsed);

    kernel::os_int_exit();
}

/// Age the delayed-task list by `elapsed` ticks, waking everything that
/// expired.
fn process_delayed_tasks(elapsed: OsTick) {
    unsafe {
        kernel::delayed_list().advance(elapsed, |tcb_ptr| {
            let tcb = &mut *tcb_ptr.as_ptr();
            if tcb.task_state == OsTaskState::Delayed {
                tcb.task_state = OsTaskState::Ready;
                if tcb.flags & task_flags::SUSPEND_REQUESTED != 0 {
                    tcb.task_state = OsTaskState::Suspended;
                } else {
                    sched::os_rdy_list_insert(tcb_ptr);
                }
            } else {
                unlink::finish_wait(tcb_ptr, OsPendStatus::Timeout);
            }
        });
    }
}

/// SysTick interrupt handler
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_handler();
}
