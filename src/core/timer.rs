//! Software watchdog timers
//!
//! A doubly linked list of active timers, delta-encoded the same way as
//! the delayed-task list, ticked from [`crate::time::os_tick_handler`].
//! Expired callbacks run outside the critical section — a callback that
//! takes a while, or itself calls back into the kernel, must not hold
//! off every other interrupt while it does.

use core::ptr::NonNull;

use crate::config::CFG_TIMER_MAX;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::time::delta_list::DeltaLinked;
use crate::types::{OsObjKind, OsOpt, OsTick};

/// Timer callback. Returning non-zero restarts the timer with its
/// original reload; returning zero leaves it stopped.
pub type OsTimerFn = fn(*mut ()) -> i32;

/// A single software timer.
pub struct OsTimer {
    obj_kind: OsObjKind,

    delta_next_ptr: Option<NonNull<OsTimer>>,
    delta_prev_ptr: Option<NonNull<OsTimer>>,
    delta_ticks: OsTick,

    /// Ticks until first expiry, as originally configured.
    dly: OsTick,
    /// Reload period for a periodic timer; 0 means one-shot.
    period: OsTick,
    callback: Option<OsTimerFn>,
    arg: *mut (),
    running: bool,

    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsTimer {
    pub const fn new() -> Self {
        OsTimer {
            obj_kind: OsObjKind::Timer,
            delta_next_ptr: None,
            delta_prev_ptr: None,
            delta_ticks: 0,
            dly: 0,
            period: 0,
            callback: None,
            arg: core::ptr::null_mut(),
            running: false,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Configure the timer. Does not start it — call [`OsTimer::start`]
    /// separately. `dly` is the first-expiry delay; `period` is the
    /// reload used after each firing (0 for a one-shot timer).
    pub fn create(
        &mut self,
        dly: OsTick,
        period: OsTick,
        callback: OsTimerFn,
        arg: *mut (),
        _name: &'static str,
        _opt: OsOpt,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        if dly == 0 && period == 0 {
            return Err(OsError::TmrInvalidDly);
        }

        critical_section(|_cs| {
            if self.running {
                unsafe { kernel::timer_list().remove(NonNull::from(&mut *self)) };
            }
            self.obj_kind = OsObjKind::Timer;
            self.dly = dly;
            self.period = period;
            self.callback = Some(callback);
            self.arg = arg;
            self.running = false;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Start (or restart) the timer. Restarting an already-running timer
    /// resets its countdown to the original `dly`, it does not continue
    /// counting down from where it was.
    pub fn start(&mut self) -> OsResult<()> {
        if self.obj_kind != OsObjKind::Timer {
            return Err(OsError::ObjType);
        }

        let callback = self.callback.ok_or(OsError::TmrNoCallback)?;
        let _ = callback;

        let first_delay = if self.dly != 0 { self.dly } else { self.period };
        if first_delay == 0 {
            return Err(OsError::TmrInvalidDly);
        }

        critical_section(|_cs| {
            if self.running {
                unsafe { kernel::timer_list().remove(NonNull::from(&mut *self)) };
            }
            self.running = true;
            unsafe { kernel::timer_list().insert(NonNull::from(&mut *self), first_delay) };
            Ok(())
        })
    }

    /// Stop the timer. A no-op if it isn't running.
    pub fn stop(&mut self) -> OsResult<()> {
        if self.obj_kind != OsObjKind::Timer {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if self.running {
                unsafe { kernel::timer_list().remove(NonNull::from(&mut *self)) };
                self.running = false;
            }
            Ok(())
        })
    }

    /// Replace the callback, argument, and first-expiry delay. The timer
    /// must be stopped first.
    pub fn set(&mut self, callback: OsTimerFn, arg: *mut (), timeout: OsTick) -> OsResult<()> {
        if self.obj_kind != OsObjKind::Timer {
            return Err(OsError::ObjType);
        }

        if self.running {
            return Err(OsError::TmrInvalidState);
        }

        if timeout == 0 && self.period == 0 {
            return Err(OsError::TmrInvalidDly);
        }

        critical_section(|_cs| {
            self.callback = Some(callback);
            self.arg = arg;
            self.dly = timeout;
            Ok(())
        })
    }

    /// Tear the timer down, stopping it first if running.
    pub fn del(&mut self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }

        critical_section(|_cs| {
            if self.running {
                unsafe { kernel::timer_list().remove(NonNull::from(&mut *self)) };
            }
            self.running = false;
            self.callback = None;
            self.dly = 0;
            self.period = 0;
            Ok(())
        })
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn period(&self) -> OsTick {
        self.period
    }
}

impl Default for OsTimer {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTimer {}
unsafe impl Sync for OsTimer {}

impl DeltaLinked for OsTimer {
    #[inline]
    fn delta_next(&self) -> Option<NonNull<Self>> {
        self.delta_next_ptr
    }
    #[inline]
    fn set_delta_next(&mut self, v: Option<NonNull<Self>>) {
        self.delta_next_ptr = v;
    }
    #[inline]
    fn delta_prev(&self) -> Option<NonNull<Self>> {
        self.delta_prev_ptr
    }
    #[inline]
    fn set_delta_prev(&mut self, v: Option<NonNull<Self>>) {
        self.delta_prev_ptr = v;
    }
    #[inline]
    fn delta(&self) -> OsTick {
        self.delta_ticks
    }
    #[inline]
    fn set_delta(&mut self, v: OsTick) {
        self.delta_ticks = v;
    }
}

/// Age the active-timer list by `elapsed` ticks, firing whatever expired.
///
/// Called from the tick handler, inside the critical section for the
/// list walk only — the collected callbacks run after the section is
/// released, bounded by `CFG_TIMER_MAX` expiries per call (a generous
/// upper bound; in practice at most a handful share a tick, though a
/// tick-stretch wakeup replaying many elapsed ticks at once could expire
/// more).
pub(crate) fn process_timers(elapsed: OsTick) {
    let mut due: [Option<NonNull<OsTimer>>; CFG_TIMER_MAX] = [None; CFG_TIMER_MAX];
    let mut due_count = 0usize;

    critical_section(|_cs| unsafe {
        kernel::timer_list().advance(elapsed, |tmr_ptr| {
            if due_count < CFG_TIMER_MAX {
                due[due_count] = Some(tmr_ptr);
                due_count += 1;
            }
        });
    });

    for slot in due.iter().take(due_count) {
        let tmr_ptr = slot.expect("populated slot");
        let tmr = unsafe { &mut *tmr_ptr.as_ptr() };
        tmr.running = false;

        let restart = match tmr.callback {
            Some(cb) => cb(tmr.arg) != 0,
            None => false,
        };

        if restart && tmr.period != 0 {
            critical_section(|_cs| unsafe {
                tmr.running = true;
                kernel::timer_list().insert(NonNull::from(&mut *tmr), tmr.period);
            });
        }
    }
}
