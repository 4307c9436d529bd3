//! Core type definitions for the kernel
//!
//! These types provide strong typing for RTOS primitives. Priority 0 is the
//! idle task's priority and the *lowest* priority in the system; larger
//! numeric values are higher priority (see `DESIGN.md` for why this differs
//! from the classic µC/OS "priority 0 is highest" convention).

/// Task priority (0 = idle / lowest priority)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u32;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Option flags for API calls
pub type OsOpt = u16;

/// Message size type
pub type OsMsgSize = usize;

/// Object quantity type
pub type OsObjQty = u16;

/// Stack element type
pub type OsStkElement = u32;

/// Event/signal flags type
pub type OsFlags = u32;

/// Internal (kernel-owned) bits of a task's flags word. User flags occupy
/// the low 16 bits; these occupy the high bits.
pub mod task_flags {
    use super::OsFlags;

    pub const SUSPEND_REQUESTED: OsFlags = 1 << 16;
    pub const STACK_OVERFLOW: OsFlags = 1 << 17;
    pub const STACK_THRESHOLD_REACHED: OsFlags = 1 << 18;
    pub const AWOKEN_BY_TIMEOUT: OsFlags = 1 << 19;
    pub const AWOKEN_BY_FLUSH: OsFlags = 1 << 20;
    pub const WAITING_ON_QUEUE_PUT: OsFlags = 1 << 21;
    pub const STACK_OWNED_BY_KERNEL: OsFlags = 1 << 22;
    pub const RECLAIM_REENTRANT_CONTEXT: OsFlags = 1 << 23;

    pub const USER_MASK: OsFlags = 0x0000_FFFF;
}

/// Task state. The state names the list that currently holds the TCB's
/// `listNode` (or the ready bitmap), except `MutexWait`/`SemWait`/
/// `QueueWait`/`IoWait` with a finite timeout, which *also* occupy the
/// delayed list via `listNode` while `waitNode` sits on the sync object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsTaskState {
    /// Slot unused / task deleted
    None = 0,
    /// Task is ready to run
    Ready = 1,
    /// Task is delayed (sleeping on the delta list, no sync object)
    Delayed = 2,
    /// Task is suspended
    Suspended = 3,
    /// Task is waiting on a mutex
    MutexWait = 4,
    /// Task is waiting on a semaphore
    SemWait = 5,
    /// Task is waiting on a signal set
    SigWait = 6,
    /// Task is waiting on a queue (put or get side, see `pend_on`)
    QueueWait = 7,
    /// Task is waiting on an I/O driver event
    IoWait = 8,
}

/// What a task is currently blocked on (tagged union over wait kinds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsPendOn {
    Nothing = 0,
    Mutex = 1,
    Semaphore = 2,
    QueuePut = 3,
    QueueGet = 4,
    Io = 5,
    Signal = 6,
}

/// Outcome recorded on a TCB when it is unblocked, consulted at the wake
/// site to distinguish success from timeout/flush/abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsPendStatus {
    Ok = 0,
    Timeout = 1,
    Flush = 2,
    Abort = 3,
    Del = 4,
}

/// Kernel object kind, used as a debug/type tag on every sync primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsObjKind {
    Task = 0,
    Mutex = 1,
    Sem = 2,
    Queue = 3,
    Timer = 4,
    BufPool = 5,
}

pub mod opt {
    use super::OsOpt;

    pub const NONE: OsOpt = 0x0000;

    // Pend options
    pub const PEND_BLOCKING: OsOpt = 0x0000;
    pub const PEND_NON_BLOCKING: OsOpt = 0x8000;

    // Post options
    pub const POST_FIFO: OsOpt = 0x0000;
    pub const POST_NO_SCHED: OsOpt = 0x8000;

    // Task creation options
    pub const TASK_NONE: OsOpt = 0x0000;
    pub const TASK_STK_CHK: OsOpt = 0x0001;
    pub const TASK_SUSPENDED: OsOpt = 0x0002;

    // Queue creation options
    pub const QUEUE_FIFO: OsOpt = 0x0000;
    pub const QUEUE_PRIO: OsOpt = 0x0001;
    pub const QUEUE_POINTER: OsOpt = 0x0002;

    // Buffer pool creation options
    pub const BUFPOOL_KERNEL_OWNED: OsOpt = 0x0000;
    pub const BUFPOOL_APP_OWNED: OsOpt = 0x0001;

    // Delete options
    pub const DEL_NO_PEND: OsOpt = 0x0000;
    pub const DEL_ALWAYS: OsOpt = 0x0001;
}
