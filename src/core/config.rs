//! Compile-time configuration
//!
//! These constants control the behavior and resource limits of the RTOS.
//! All of them are meant to be tuned per-application; the values here are
//! sized for a small Cortex-M controller.

use crate::types::OsTick;

/// Maximum number of priority levels. Priority 0 is reserved for the idle
/// task. Affects the ready-bitmap width (1-word, 2-word, or 2-level).
pub const CFG_PRIO_MAX: usize = 64;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// CPU clock driving the SysTick counter, in Hz. Used to derive the
/// per-tick reload value (`CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ`) and,
/// when tick-stretching, a multiple of it.
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// Default time quanta for round-robin scheduling
pub const CFG_TIME_QUANTA_DEFAULT: u32 = 10;

/// Minimum task stack size
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Idle task priority — always 0, the lowest priority in the system
pub const CFG_PRIO_IDLE: u8 = 0;

/// Maximum number of software timers
pub const CFG_TIMER_MAX: usize = 16;

/// Enable round-robin scheduling for same-priority tasks
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Enable tick-stretching (low-power idle sleep) — see `core::time::stretch`
pub const CFG_TICK_STRETCH_EN: bool = true;

/// Maximum hardware-timer reload the tick-stretch mechanism may program, in
/// ticks, regardless of how far away the next wakeup is.
pub const CFG_TICK_STRETCH_MAX_TICKS: OsTick = 60_000;

/// Enable per-task CPU usage accounting
pub const CFG_TASK_STAT_EN: bool = true;

/// Enable critical-section duration watermark instrumentation
pub const CFG_CRITICAL_STAT_EN: bool = true;
