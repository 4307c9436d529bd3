//! Synchronization primitives
//!
//! Mutexes, counting semaphores, message queues and buffer pools — every
//! blocking primitive a task can pend on besides the delta list itself.

pub mod bufpool;
pub mod mutex;
pub mod queue;
pub mod sem;
