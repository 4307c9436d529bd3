//! Critical section handling
//!
//! Provides the kernel's sole mutual-exclusion primitive: a nestable,
//! interrupt-masking region. Every piece of shared kernel state (ready
//! bitmap, pools, wait lists) is only ever mutated from inside one of
//! these.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::CFG_CRITICAL_STAT_EN;

/// Current nesting depth. 0 means interrupts are enabled.
static NESTING: AtomicU32 = AtomicU32::new(0);

/// Highest critical-section duration observed, in CPU cycles (DWT
/// `CYCCNT` ticks on Cortex-M; always 0 on host builds, where there's no
/// cycle counter to sample). Gated by `CFG_CRITICAL_STAT_EN`.
static MAX_DURATION_CYCLES: AtomicU32 = AtomicU32::new(0);

/// Cycle count sampled on entering the outermost (nesting depth 0 -> 1)
/// critical section; used to compute the duration on exit.
static ENTER_CYCLES: AtomicU32 = AtomicU32::new(0);

/// RAII guard for a critical section.
///
/// Entering disables interrupts (on the outermost guard only); dropping
/// restores them (on the outermost guard only). Guards may nest freely —
/// a second `enter()` while already inside one just bumps the counter.
pub struct CriticalSection {
    _private: (),
}

impl CriticalSection {
    /// Enter a critical section, disabling interrupts if not already
    /// inside one. Returns a guard that restores interrupt state when the
    /// outermost guard in the nest is dropped.
    #[inline(always)]
    pub fn enter() -> Self {
        let depth = NESTING.fetch_add(1, Ordering::AcqRel);
        if depth == 0 {
            #[cfg(target_arch = "arm")]
            cortex_m::interrupt::disable();

            if CFG_CRITICAL_STAT_EN {
                ENTER_CYCLES.store(read_cycle_counter(), Ordering::Relaxed);
            }
        }
        CriticalSection { _private: () }
    }

    /// Check if we're currently inside a critical section (any nesting
    /// depth).
    #[inline(always)]
    pub fn is_active() -> bool {
        NESTING.load(Ordering::Acquire) != 0
    }

    /// Current nesting depth (0 = not in a critical section).
    #[inline(always)]
    pub fn depth() -> u32 {
        NESTING.load(Ordering::Acquire)
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        let prior = NESTING.fetch_sub(1, Ordering::AcqRel);
        if prior == 1 {
            if CFG_CRITICAL_STAT_EN {
                let elapsed = read_cycle_counter().wrapping_sub(ENTER_CYCLES.load(Ordering::Relaxed));
                MAX_DURATION_CYCLES.fetch_max(elapsed, Ordering::Relaxed);
            }

            #[cfg(target_arch = "arm")]
            unsafe {
                cortex_m::interrupt::enable()
            };
        }
    }
}

/// Longest critical section observed so far, in CPU cycles. Zero if
/// `CFG_CRITICAL_STAT_EN` is disabled or no cycle counter is available.
pub fn max_duration_cycles() -> u32 {
    MAX_DURATION_CYCLES.load(Ordering::Relaxed)
}

/// Reset the critical-section duration watermark.
pub fn reset_max_duration() {
    MAX_DURATION_CYCLES.store(0, Ordering::Relaxed);
}

#[inline]
fn read_cycle_counter() -> u32 {
    #[cfg(target_arch = "arm")]
    {
        cortex_m::peripheral::DWT::cycle_count()
    }
    #[cfg(not(target_arch = "arm"))]
    {
        0
    }
}

/// Execute a closure with interrupts disabled.
///
/// The closure receives a reference to the critical section guard, which
/// can be used to access [`crate::core::cs_cell`]-protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

/// Mask priority levels using BASEPRI (Cortex-M3/M4/M7)
///
/// This allows selective interrupt masking where only interrupts
/// with a priority value >= the mask value are blocked.
#[inline]
pub fn set_basepri(priority: u8) {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!(
            "msr BASEPRI, {}",
            in(reg) priority as u32,
            options(nomem, nostack, preserves_flags)
        );
    }

    #[cfg(not(target_arch = "arm"))]
    {
        let _ = priority;
    }
}

/// Get current BASEPRI value
#[inline]
pub fn get_basepri() -> u8 {
    #[cfg(target_arch = "arm")]
    {
        let basepri: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, BASEPRI",
                out(reg) basepri,
                options(nomem, nostack, preserves_flags)
            );
        }
        basepri as u8
    }

    #[cfg(not(target_arch = "arm"))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_without_reenabling_early() {
        assert!(!CriticalSection::is_active());
        let outer = CriticalSection::enter();
        assert_eq!(CriticalSection::depth(), 1);
        {
            let _inner = CriticalSection::enter();
            assert_eq!(CriticalSection::depth(), 2);
        }
        assert_eq!(CriticalSection::depth(), 1);
        assert!(CriticalSection::is_active());
        drop(outer);
        assert!(!CriticalSection::is_active());
    }
}
