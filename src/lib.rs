//! A small preemptive real-time kernel for single-core Cortex-M parts
//!
//! - Fixed-priority preemptive scheduling with an O(1) ready-queue
//!   accelerator
//! - Mutex with priority inheritance, counting semaphore, message queue,
//!   fixed-size buffer pool
//! - Software watchdog timers driven off the same tick
//! - Tick-stretching so the idle task can sleep the hardware timer past
//!   a single tick when nothing is due sooner
//! - An I/O-driver wait primitive for blocking a task on an external event
//! - Context switching for ARM Cortex-M

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use core::config;
pub use core::config::*;
pub use core::critical;
pub use core::error;
pub use core::error::{OsError, OsResult};
pub use core::io;
pub use core::kernel;
pub use core::kernel::{os_init, os_start};
pub use core::pend_list;
pub use core::prio;
pub use core::timer;
pub use core::types;
pub use core::types::*;
pub use core::task;
pub use core::task::os_task_create;
pub use core::sched;
pub use core::time;
pub use core::unlink;

pub use sync::bufpool;
pub use sync::mutex;
pub use sync::queue;
pub use sync::sem;
pub use sync::mutex::Mutex;
pub use sync::queue::Queue;
pub use sync::sem::Semaphore;

#[cfg(feature = "pac")]
pub use stm32_metapac as pac;
