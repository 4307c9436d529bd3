//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::pend_list::PendList;
use crate::sched;
use crate::types::{opt, OsObjKind, OsOpt, OsPendOn, OsPendStatus, OsSemCtr, OsTaskState, OsTick};

/// Counting semaphore
pub struct OsSem {
    /// Object kind marker
    obj_kind: OsObjKind,
    /// List of tasks waiting on this semaphore, highest priority first
    pend_list: PendList,
    /// Current count
    count: OsSemCtr,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsSem {
    /// Create a new semaphore
    ///
    /// # Arguments
    /// * `count` - Initial count value
    pub const fn new(count: OsSemCtr) -> Self {
        OsSem {
            obj_kind: OsObjKind::Sem,
            pend_list: PendList::new(),
            count,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the semaphore
    pub fn create(&mut self, count: OsSemCtr, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            self.obj_kind = OsObjKind::Sem;
            self.pend_list.init();
            self.count = count;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Wait on (pend) the semaphore
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = forever)
    /// * `pend_opt` - Pend options
    ///
    /// # Returns
    /// * `Ok(count)` - Semaphore acquired, returns current count
    /// * `Err(OsError::Timeout)` - Timeout expired
    /// * `Err(OsError::PendWouldBlock)` - Non-blocking and not available
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_kind != OsObjKind::Sem {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if self.count > 0 {
                self.count -= 1;
                return Ok(self.count);
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

            unsafe {
                let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                sched::os_rdy_list_remove(cur_tcb_ptr);

                cur_tcb.pend_on = OsPendOn::Semaphore;
                cur_tcb.pend_status = OsPendStatus::Ok;
                cur_tcb.pend_obj_ptr = self as *mut _ as *mut ();
                cur_tcb.task_state = OsTaskState::SemWait;

                self.pend_list.insert_by_prio(cur_tcb_ptr);

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
                    OsPendStatus::Ok => Ok(self.count),
                    OsPendStatus::Timeout => Err(OsError::Timeout),
                    OsPendStatus::Flush => Err(OsError::PendDel),
                    OsPendStatus::Del => Err(OsError::ObjDel),
                    OsPendStatus::Abort => Err(OsError::PendAbort),
                }
            }
        })
    }

    /// Signal (post) the semaphore
    ///
    /// # Returns
    /// * `Ok(count)` - New count after post
    /// * `Err(OsError::SemOvf)` - Counter overflow
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<OsSemCtr> {
        if self.obj_kind != OsObjKind::Sem {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if let Some(tcb_ptr) = self.pend_list.head() {
                self.pend_list.remove(tcb_ptr);
                let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

                if tcb.on_delta_list() {
                    unsafe { kernel::delayed_list().remove(tcb_ptr) };
                }

                tcb.pend_on = OsPendOn::Nothing;
                tcb.pend_status = OsPendStatus::Ok;
                tcb.pend_obj_ptr = core::ptr::null_mut();
                tcb.task_state = OsTaskState::Ready;

                unsafe { sched::os_rdy_list_insert(tcb_ptr) };

                if post_opt & opt::POST_NO_SCHED == 0 && !is_isr_context() {
                    sched::os_sched();
                }

                Ok(self.count)
            } else {
                if self.count == OsSemCtr::MAX {
                    return Err(OsError::SemOvf);
                }
                self.count += 1;
                Ok(self.count)
            }
        })
    }

    /// Wake every waiter at once without incrementing the count, e.g. to
    /// broadcast "abandon this wait" on a shutdown condition. Woken tasks
    /// observe `OsError::ObjDel`.
    pub fn flush(&mut self, flush_opt: OsOpt) -> OsResult<usize> {
        if is_isr_context() {
            return Err(OsError::FlushIsr);
        }

        if self.obj_kind != OsObjKind::Sem {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            let woken = self.pend_list.flush(|tcb_ptr| unsafe {
                let tcb = &mut *tcb_ptr.as_ptr();
                if tcb.on_delta_list() {
                    kernel::delayed_list().remove(tcb_ptr);
                }
                tcb.task_state = OsTaskState::Ready;
                sched::os_rdy_list_insert(tcb_ptr);
            });

            if woken > 0 && flush_opt & opt::POST_NO_SCHED == 0 {
                sched::os_sched();
            }

            Ok(woken)
        })
    }

    /// Get current semaphore count
    #[inline(always)]
    pub fn count(&self) -> OsSemCtr {
        self.count
    }

    #[inline]
    pub(crate) fn pend_list_mut(&mut self) -> &mut PendList {
        &mut self.pend_list
    }

    /// Forcibly set the semaphore count, typically used to re-arm a
    /// semaphore between uses. Does not wake waiters — waiters only
    /// drain via `pend`/`post`/`flush`.
    pub fn reset(&mut self, count: OsSemCtr) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::AcceptIsr);
        }

        critical_section(|_cs| {
            self.count = count;
            Ok(())
        })
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new(0)
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new(count: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new(count)),
        }
    }

    pub fn create(&self, count: OsSemCtr, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(count, name) }
    }

    pub fn wait(&self, timeout: OsTick, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).pend(timeout, opt) }
    }

    pub fn signal(&self, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).post(opt) }
    }

    pub fn flush(&self, opt: OsOpt) -> OsResult<usize> {
        unsafe { (*self.inner.get()).flush(opt) }
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
