//! Tick-stretch idle sleep
//!
//! When nothing is due for a while, the idle task can reprogram SysTick
//! to fire once after several ticks' worth of cycles instead of once per
//! tick, and sleep the core (`wfi`) in between. The tick handler is told
//! how many ticks the next firing represents so the delayed-task and
//! timer lists replay correctly, then SysTick is put back to its normal
//! one-tick reload.
//!
//! Gated by [`CFG_TICK_STRETCH_EN`]; disabled, `idle_sleep` just does a
//! plain single-tick `wfi`.

use crate::config::{CFG_TICK_STRETCH_EN, CFG_TICK_STRETCH_MAX_TICKS};
use crate::critical::critical_section;
use crate::kernel;
use crate::types::OsTick;

/// Sleep the core until the next tick, or — with tick-stretching enabled
/// and nothing due sooner — until the next delayed task or timer expiry,
/// capped at [`CFG_TICK_STRETCH_MAX_TICKS`].
pub fn idle_sleep() {
    if !CFG_TICK_STRETCH_EN {
        wait_for_interrupt();
        return;
    }

    let reload = kernel::tick_reload();
    if reload == 0 {
        // os_start hasn't run yet.
        wait_for_interrupt();
        return;
    }

    let sleep_ticks = next_wakeup_ticks();

    if sleep_ticks <= 1 {
        wait_for_interrupt();
        return;
    }

    critical_section(|_cs| kernel::set_pending_ticks(sleep_ticks));
    crate::port::os_cpu_systick_init(reload.saturating_mul(sleep_ticks));

    wait_for_interrupt();

    // The SysTick ISR ran os_tick_handler during the wfi above, consuming
    // the pending tick count; restore the normal one-tick cadence.
    crate::port::os_cpu_systick_init(reload);
}

/// Ticks until the sooner of the next delayed-task or timer expiry,
/// capped at `CFG_TICK_STRETCH_MAX_TICKS`. Falls back to the cap itself
/// when nothing is queued, since idle has nothing to wake early for.
fn next_wakeup_ticks() -> OsTick {
    let (delayed, timers) = critical_section(|_cs| unsafe {
        (kernel::delayed_list().head_delta(), kernel::timer_list().head_delta())
    });

    let next = match (delayed, timers) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => CFG_TICK_STRETCH_MAX_TICKS,
    };

    next.clamp(1, CFG_TICK_STRETCH_MAX_TICKS)
}

#[inline]
fn wait_for_interrupt() {
    #[cfg(target_arch = "arm")]
    cortex_m::asm::wfi();
}
