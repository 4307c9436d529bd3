//! I/O driver wait primitive
//!
//! The bridge between an ISR and a task blocked on an external event —
//! UART RX, ADC sample ready, TCP buffer available, anything that fires
//! from interrupt context and has at most a handful of waiters. A driver
//! embeds one [`OsIoDesc`] per wait reason and calls `io_resume` from its
//! interrupt handler.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::pend_list::PendList;
use crate::sched;
use crate::types::{task_flags, OsPendOn, OsPendStatus, OsTaskState, OsTick};

/// A single driver's waiting list.
pub struct OsIoDesc {
    pend_list: PendList,
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsIoDesc {
    pub const fn new() -> Self {
        OsIoDesc {
            pend_list: PendList::new(),
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    pub fn create(&mut self, _name: &'static str) {
        critical_section(|_cs| {
            self.pend_list.init();
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
        });
    }

    /// Block the calling task on this driver's event, waking either when
    /// `io_resume` pops it or `timeout` ticks elapse (0 = forever).
    ///
    /// `ordered` selects priority-ordered insertion (highest priority
    /// served first) over plain FIFO arrival order.
    pub fn io_wait(&mut self, ordered: bool, timeout: OsTick) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        critical_section(|_cs| {
            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::PendLocked);
            }

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

            unsafe {
                let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                sched::os_rdy_list_remove(cur_tcb_ptr);

                cur_tcb.pend_on = OsPendOn::Io;
                cur_tcb.pend_status = OsPendStatus::Ok;
                cur_tcb.pend_obj_ptr = self as *mut _ as *mut ();
                cur_tcb.task_state = OsTaskState::IoWait;

                if ordered {
                    self.pend_list.insert_by_prio(cur_tcb_ptr);
                } else {
                    self.pend_list.insert_fifo(cur_tcb_ptr);
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
                match cur_tcb.pend_status {
                    OsPendStatus::Ok => Ok(()),
                    OsPendStatus::Timeout => Err(OsError::Timeout),
                    OsPendStatus::Flush => Err(OsError::PendDel),
                    OsPendStatus::Del => Err(OsError::IoAbort),
                    OsPendStatus::Abort => Err(OsError::PendAbort),
                }
            }
        })
    }

    /// Pop the head waiter (highest priority, or oldest in FIFO mode) and
    /// unblock it. Callable from an ISR. A suspend requested while the
    /// task waited takes it straight to `Suspended` instead of `Ready`.
    pub fn io_resume(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            let tcb_ptr = self.pend_list.head().ok_or(OsError::PendAbortNone)?;
            self.pend_list.remove(tcb_ptr);

            unsafe {
                let tcb = &mut *tcb_ptr.as_ptr();

                if tcb.on_delta_list() {
                    kernel::delayed_list().remove(tcb_ptr);
                }

                tcb.pend_on = OsPendOn::Nothing;
                tcb.pend_status = OsPendStatus::Ok;
                tcb.pend_obj_ptr = core::ptr::null_mut();

                if tcb.flags & task_flags::SUSPEND_REQUESTED != 0 {
                    tcb.task_state = OsTaskState::Suspended;
                } else {
                    tcb.task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb_ptr);
                }
            }

            if !is_isr_context() {
                sched::os_sched();
            }

            Ok(())
        })
    }

    /// Whether any task is currently waiting on this driver.
    #[inline]
    pub fn is_waiting(&self) -> bool {
        !self.pend_list.is_empty()
    }

    #[inline]
    pub(crate) fn pend_list_mut(&mut self) -> &mut PendList {
        &mut self.pend_list
    }
}

impl Default for OsIoDesc {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe wrapper ============

use core::cell::UnsafeCell;

/// A statically-declared I/O wait point, e.g. `static UART_RX: IoWait =
/// IoWait::new();`, signalled from the UART ISR with `UART_RX.resume()`.
pub struct IoWait {
    inner: UnsafeCell<OsIoDesc>,
}

unsafe impl Sync for IoWait {}
unsafe impl Send for IoWait {}

impl IoWait {
    pub const fn new() -> Self {
        IoWait {
            inner: UnsafeCell::new(OsIoDesc::new()),
        }
    }

    pub fn create(&self, name: &'static str) {
        unsafe { (*self.inner.get()).create(name) }
    }

    pub fn wait(&self, ordered: bool, timeout: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).io_wait(ordered, timeout) }
    }

    pub fn resume(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).io_resume() }
    }

    pub fn is_waiting(&self) -> bool {
        unsafe { (*self.inner.get()).is_waiting() }
    }
}

impl Default for IoWait {
    fn default() -> Self {
        Self::new()
    }
}
