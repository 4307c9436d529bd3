//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task. TCBs are
//! never heap-allocated; every one lives in the fixed pool owned by
//! `kernel::KernelPools` and is referred to externally only by handle.

use core::ptr::NonNull;

use crate::sync::mutex::OsMutex;
use crate::types::{
    OsFlags, OsMsgSize, OsNestingCtr, OsOpt, OsPendOn, OsPendStatus,
    OsPrio, OsSemCtr, OsStkElement, OsTaskState, OsTick,
};

/// Task Control Block
#[repr(C)]
pub struct OsTcb {
    // ============ Stack pointer ============
    /// Current stack pointer
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Base of stack
    pub stk_base: *mut OsStkElement,
    /// Stack limit pointer — crossing this triggers `task_flags::STACK_THRESHOLD_REACHED`
    pub stk_limit: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Task identification ============
    /// Task name
    pub name: &'static str,

    // ============ Ready list links ============
    /// Next TCB in ready list
    pub next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in ready list
    pub prev_ptr: Option<NonNull<OsTcb>>,

    // ============ Pend list links ============
    /// Next TCB in pend list
    pub pend_next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in pend list
    pub pend_prev_ptr: Option<NonNull<OsTcb>>,
    /// Object this task is pending on (cast back per `pend_on`'s tag)
    pub pend_obj_ptr: *mut (),
    /// What kind of object the task is pending on
    pub pend_on: OsPendOn,
    /// Result of the pend operation, read by the caller once woken
    pub pend_status: OsPendStatus,

    // ============ Delta (delayed/timeout) list links ============
    /// Next TCB in the delta-encoded delayed-task list
    pub dly_next: Option<NonNull<OsTcb>>,
    /// Previous TCB in the delta-encoded delayed-task list
    pub dly_prev: Option<NonNull<OsTcb>>,
    /// Ticks after the previous node's expiry at which this task wakes
    pub dly_delta: OsTick,

    // ============ Priority ============
    /// Current (possibly inherited) priority
    pub prio: OsPrio,
    /// Base (non-inherited) priority
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state
    pub task_state: OsTaskState,
    /// Task options
    pub opt: OsOpt,
    /// Kernel-internal flags, see `types::task_flags`
    pub flags: OsFlags,

    // ============ Suspend ============
    /// Suspend nesting counter
    pub suspend_ctr: OsNestingCtr,

    // ============ Time slicing ============
    /// Time quanta for this task
    pub time_quanta: OsTick,
    /// Remaining time quanta
    pub time_quanta_ctr: OsTick,

    // ============ Task semaphore ============
    /// Task-specific semaphore counter
    pub sem_ctr: OsSemCtr,

    // ============ Signal wait (carried as state only, see DESIGN.md) ============
    /// Signals being waited for
    pub sig_wait: OsFlags,
    /// Signals received so far
    pub sig_rdy: OsFlags,

    // ============ Message ============
    /// Message pointer, valid only while `pend_on == QueueGet` and
    /// `pend_status == Ok`
    pub msg_ptr: *const (),
    /// Message size
    pub msg_size: OsMsgSize,

    // ============ Mutex priority inheritance ============
    /// Head of the intrusive list of mutexes owned by this task, used to
    /// re-derive the inherited priority on release (see `sync::mutex`)
    pub mutex_owned_head: Option<NonNull<OsMutex>>,

    // ============ Task entry point ============
    /// Task function address
    pub task_entry_addr: u32,
    /// Task argument
    pub task_entry_arg: *mut (),

    // ============ Bookkeeping ============
    /// Accumulated ticks this task has been the running task, used by
    /// `CFG_TASK_STAT_EN`
    pub cpu_usage_ticks: OsTick,
    /// Next TCB in the zombie (deleted-but-not-yet-reclaimed) list, used
    /// when a task deletes itself: the TCB can't free its own stack while
    /// still running on it, so it's parked here for the idle task to
    /// reclaim
    pub zombie_next: Option<NonNull<OsTcb>>,

    // ============ Extension pointer ============
    /// User-defined extension data
    pub ext_ptr: *mut (),
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_limit: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            next_ptr: None,
            prev_ptr: None,

            pend_next_ptr: None,
            pend_prev_ptr: None,
            pend_obj_ptr: core::ptr::null_mut(),
            pend_on: OsPendOn::Nothing,
            pend_status: OsPendStatus::Ok,

            dly_next: None,
            dly_prev: None,
            dly_delta: 0,

            prio: 0,
            base_prio: 0,

            task_state: OsTaskState::None,
            opt: 0,
            flags: 0,

            suspend_ctr: 0,

            time_quanta: 0,
            time_quanta_ctr: 0,

            sem_ctr: 0,

            sig_wait: 0,
            sig_rdy: 0,

            msg_ptr: core::ptr::null(),
            msg_size: 0,

            mutex_owned_head: None,

            task_entry_addr: 0,
            task_entry_arg: core::ptr::null_mut(),

            cpu_usage_ticks: 0,
            zombie_next: None,

            ext_ptr: core::ptr::null_mut(),
        }
    }

    /// Initialize TCB to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if task is ready to run
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.task_state == OsTaskState::Ready
    }

    /// Check if task is waiting on a sync object or I/O event
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(
            self.task_state,
            OsTaskState::MutexWait
                | OsTaskState::SemWait
                | OsTaskState::SigWait
                | OsTaskState::QueueWait
                | OsTaskState::IoWait
        )
    }

    /// Check if task is suspended
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.task_state == OsTaskState::Suspended
    }

    /// Check if task is delayed (sleeping on the delta list with no sync
    /// object)
    #[inline]
    pub fn is_delayed(&self) -> bool {
        self.task_state == OsTaskState::Delayed
    }

    /// Check if this task currently has a finite pend timeout running on
    /// the delta list (true for both plain `Delayed` and any `*Wait`
    /// state entered with a nonzero timeout)
    #[inline]
    pub fn on_delta_list(&self) -> bool {
        self.dly_next.is_some() || self.dly_prev.is_some() || self.dly_delta != 0
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}

impl crate::time::delta_list::DeltaLinked for OsTcb {
    #[inline]
    fn delta_next(&self) -> Option<NonNull<Self>> {
        self.dly_next
    }
    #[inline]
    fn set_delta_next(&mut self, v: Option<NonNull<Self>>) {
        self.dly_next = v;
    }
    #[inline]
    fn delta_prev(&self) -> Option<NonNull<Self>> {
        self.dly_prev
    }
    #[inline]
    fn set_delta_prev(&mut self, v: Option<NonNull<Self>>) {
        self.dly_prev = v;
    }
    #[inline]
    fn delta(&self) -> OsTick {
        self.dly_delta
    }
    #[inline]
    fn set_delta(&mut self, v: OsTick) {
        self.dly_delta = v;
    }
}
