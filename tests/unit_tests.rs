//! Unit tests for core RTOS modules
//!
//! These tests run on the host (not embedded target) to verify
//! the core algorithms work correctly.

#[cfg(test)]
mod prio_tests {
    use aacos::prio::PrioTable;
    use aacos::config::CFG_PRIO_MAX;

    #[test]
    fn test_empty_table() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), 0);
    }

    #[test]
    fn test_single_priority() {
        let mut table = PrioTable::new();

        table.insert(5);
        assert!(!table.is_empty());
        assert!(table.is_set(5));
        assert!(!table.is_set(4));
        assert_eq!(table.get_highest(), 5);

        table.remove(5);
        assert!(table.is_empty());
    }

    #[test]
    fn test_multiple_priorities() {
        let mut table = PrioTable::new();

        // Insert in random order
        table.insert(20);
        table.insert(5);
        table.insert(10);
        table.insert(0);
        table.insert(15);

        // Highest priority value wins
        assert_eq!(table.get_highest(), 20);

        // Remove in descending order
        table.remove(20);
        assert_eq!(table.get_highest(), 15);

        table.remove(15);
        assert_eq!(table.get_highest(), 10);

        table.remove(10);
        assert_eq!(table.get_highest(), 5);

        table.remove(5);
        assert_eq!(table.get_highest(), 0);

        table.remove(0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_boundary_priorities() {
        let mut table = PrioTable::new();

        // Test at word boundaries (31, 32, 33)
        table.insert(31);
        assert_eq!(table.get_highest(), 31);

        table.insert(32);
        assert_eq!(table.get_highest(), 32);

        table.remove(32);
        assert_eq!(table.get_highest(), 31);

        table.insert(0);
        assert_eq!(table.get_highest(), 31);

        table.insert(63);
        table.remove(0);
        table.remove(31);
        assert_eq!(table.get_highest(), 63);
    }

    #[test]
    fn test_all_priorities() {
        let mut table = PrioTable::new();

        // Insert all priorities
        for i in 0..CFG_PRIO_MAX {
            table.insert(i as u8);
        }

        // Highest should be the top of the range
        assert_eq!(table.get_highest(), (CFG_PRIO_MAX - 1) as u8);

        // Remove from highest to lowest
        for i in (0..CFG_PRIO_MAX).rev() {
            assert_eq!(table.get_highest(), i as u8);
            table.remove(i as u8);
        }

        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_insert_remove() {
        let mut table = PrioTable::new();

        // Insert same priority twice
        table.insert(10);
        table.insert(10);
        assert_eq!(table.get_highest(), 10);

        // First remove clears the bit
        table.remove(10);
        // Table should be empty now (bit is cleared)
        // Note: This tests that we don't track count per priority
        assert!(table.is_empty());
    }
}

#[cfg(test)]
mod error_tests {
    use aacos::error::OsError;

    #[test]
    fn test_error_variants() {
        assert!(OsError::None.is_ok());
        assert!(!OsError::None.is_err());

        assert!(!OsError::Timeout.is_ok());
        assert!(OsError::Timeout.is_err());

        assert_eq!(OsError::None, OsError::None);
        assert_ne!(OsError::None, OsError::Timeout);
    }

    #[test]
    fn test_error_debug() {
        // Ensure errors can be formatted for debugging
        let err = OsError::PendIsr;
        let _ = format!("{:?}", err);
    }
}

#[cfg(test)]
mod types_tests {
    use aacos::types::*;

    #[test]
    fn test_task_state_enum() {
        let state = OsTaskState::Ready;
        assert_eq!(state, OsTaskState::Ready);
        assert_ne!(state, OsTaskState::Delayed);
    }

    #[test]
    fn test_pend_status_enum() {
        let status = OsPendStatus::Ok;
        assert_eq!(status, OsPendStatus::Ok);
        assert_ne!(status, OsPendStatus::Timeout);
    }

    #[test]
    fn test_option_flags() {
        use aacos::types::opt::*;

        assert_eq!(NONE, 0);
        assert_eq!(PEND_NON_BLOCKING, 0x8000);
        assert_eq!(POST_NO_SCHED, 0x8000);

        // Test combining flags
        let combined = POST_FIFO | POST_NO_SCHED;
        assert_eq!(combined & POST_NO_SCHED, POST_NO_SCHED);
    }
}

#[cfg(test)]
mod config_tests {
    use aacos::config::*;

    #[test]
    fn test_config_values() {
        assert!(CFG_PRIO_MAX >= 8, "Need at least 8 priority levels");
        assert!(CFG_PRIO_MAX <= 256, "Too many priority levels");

        assert!(CFG_STK_SIZE_MIN >= 32, "Stack too small");

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");

        // Idle priority is reserved at the bottom of the range
        assert_eq!(CFG_PRIO_IDLE, 0);
    }

    #[test]
    fn test_cpu_clock_supports_tick_reload() {
        // The SysTick reload derived from these two must be non-zero, or
        // tick-stretch has nothing to scale.
        assert!(CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ > 0);
    }
}

#[cfg(test)]
mod bufpool_tests {
    use aacos::bufpool::OsBufPool;
    use aacos::error::OsError;
    use aacos::types::opt;

    const BLOCK_SIZE: usize = 16;
    const COUNT: usize = 4;

    #[test]
    fn take_give_round_trips_through_the_freelist() {
        let mut storage = [0u8; BLOCK_SIZE * COUNT];
        let mut pool = OsBufPool::new();
        unsafe {
            pool.create(storage.as_mut_ptr(), BLOCK_SIZE, COUNT as u16, opt::NONE, "pool")
                .unwrap();
        }

        assert_eq!(pool.free_count(), COUNT as u16);

        let a = pool.take().unwrap();
        let b = pool.take().unwrap();
        assert_eq!(pool.free_count(), (COUNT - 2) as u16);
        assert_eq!(pool.get_count(), 2);

        unsafe { pool.give(a).unwrap() };
        unsafe { pool.give(b).unwrap() };
        assert_eq!(pool.free_count(), COUNT as u16);
    }

    #[test]
    fn depleted_pool_reports_error_instead_of_blocking() {
        let mut storage = [0u8; BLOCK_SIZE * 2];
        let mut pool = OsBufPool::new();
        unsafe {
            pool.create(storage.as_mut_ptr(), BLOCK_SIZE, 2, opt::NONE, "pool")
                .unwrap();
        }

        let _a = pool.take().unwrap();
        let _b = pool.take().unwrap();
        assert_eq!(pool.take().unwrap_err(), OsError::BufPoolDepleted);
    }

    #[test]
    fn reset_reclaims_outstanding_blocks() {
        let mut storage = [0u8; BLOCK_SIZE * COUNT];
        let mut pool = OsBufPool::new();
        unsafe {
            pool.create(storage.as_mut_ptr(), BLOCK_SIZE, COUNT as u16, opt::NONE, "pool")
                .unwrap();
        }

        let _a = pool.take().unwrap();
        let _b = pool.take().unwrap();
        pool.reset().unwrap();
        assert_eq!(pool.free_count(), COUNT as u16);
    }

    #[test]
    fn del_refuses_while_blocks_are_checked_out() {
        let mut storage = [0u8; BLOCK_SIZE * 2];
        let mut pool = OsBufPool::new();
        unsafe {
            pool.create(storage.as_mut_ptr(), BLOCK_SIZE, 2, opt::NONE, "pool")
                .unwrap();
        }

        let _a = pool.take().unwrap();
        assert_eq!(pool.del(opt::NONE).unwrap_err(), OsError::StateInvalid);
        assert!(pool.del(opt::DEL_ALWAYS).is_ok());
    }
}

#[cfg(test)]
mod queue_tests {
    use aacos::error::OsError;
    use aacos::queue::OsQueue;
    use aacos::types::opt;

    const ELEM: usize = 4;
    const CAP: usize = 3;

    #[test]
    fn put_get_is_fifo() {
        let mut storage = [0u8; ELEM * CAP];
        let mut q = OsQueue::new();
        unsafe {
            q.create(storage.as_mut_ptr(), ELEM, CAP, opt::NONE, "q").unwrap();
        }

        let first = 1u32.to_ne_bytes();
        let second = 2u32.to_ne_bytes();
        q.put(first.as_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap();
        q.put(second.as_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap();

        let mut out = [0u8; ELEM];
        q.get(out.as_mut_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap();
        assert_eq!(u32::from_ne_bytes(out), 1);

        q.get(out.as_mut_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap();
        assert_eq!(u32::from_ne_bytes(out), 2);
    }

    #[test]
    fn full_queue_rejects_non_blocking_put() {
        let mut storage = [0u8; ELEM * 1];
        let mut q = OsQueue::new();
        unsafe {
            q.create(storage.as_mut_ptr(), ELEM, 1, opt::NONE, "q").unwrap();
        }

        let msg = 7u32.to_ne_bytes();
        q.put(msg.as_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap();
        assert_eq!(
            q.put(msg.as_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap_err(),
            OsError::QFull
        );
    }

    #[test]
    fn empty_queue_rejects_non_blocking_get() {
        let mut storage = [0u8; ELEM * CAP];
        let mut q = OsQueue::new();
        unsafe {
            q.create(storage.as_mut_ptr(), ELEM, CAP, opt::NONE, "q").unwrap();
        }

        let mut out = [0u8; ELEM];
        assert_eq!(
            q.get(out.as_mut_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap_err(),
            OsError::QEmpty
        );
    }

    #[test]
    fn peek_reads_without_removing() {
        let mut storage = [0u8; ELEM * CAP];
        let mut q = OsQueue::new();
        unsafe {
            q.create(storage.as_mut_ptr(), ELEM, CAP, opt::NONE, "q").unwrap();
        }

        let msg = 42u32.to_ne_bytes();
        q.put(msg.as_ptr(), ELEM, 0, opt::PEND_NON_BLOCKING).unwrap();

        let peeked = unsafe { *(q.peek().unwrap() as *const u32) };
        assert_eq!(peeked, 42);
        assert_eq!(q.get_count(), 1);

        q.purge().unwrap();
        assert_eq!(q.get_count(), 0);
    }

    #[test]
    fn wrong_elem_size_is_rejected() {
        let mut storage = [0u8; ELEM * CAP];
        let mut q = OsQueue::new();
        unsafe {
            q.create(storage.as_mut_ptr(), ELEM, CAP, opt::NONE, "q").unwrap();
        }

        let msg = 1u8.to_ne_bytes();
        assert_eq!(
            q.put(msg.as_ptr(), 1, 0, opt::PEND_NON_BLOCKING).unwrap_err(),
            OsError::QMsgSize
        );
    }
}

#[cfg(test)]
mod timer_tests {
    use aacos::error::OsError;
    use aacos::timer::OsTimer;
    use aacos::types::opt;

    fn noop_cb(_: *mut ()) -> i32 {
        0
    }

    #[test]
    fn create_rejects_zero_delay_and_period() {
        let mut tmr = OsTimer::new();
        assert_eq!(
            tmr.create(0, 0, noop_cb, core::ptr::null_mut(), "t", opt::NONE).unwrap_err(),
            OsError::TmrInvalidDly
        );
    }

    #[test]
    fn fresh_timer_is_not_running_until_started() {
        let mut tmr = OsTimer::new();
        tmr.create(10, 0, noop_cb, core::ptr::null_mut(), "t", opt::NONE).unwrap();
        assert!(!tmr.is_running());
        assert_eq!(tmr.period(), 0);
    }

    #[test]
    fn set_refuses_while_running_is_not_reachable_without_os() {
        // `start()` requires a running kernel to touch the active-timer
        // list; `set` on a freshly created (stopped) timer is host-safe.
        let mut tmr = OsTimer::new();
        tmr.create(10, 5, noop_cb, core::ptr::null_mut(), "t", opt::NONE).unwrap();
        assert!(tmr.set(noop_cb, core::ptr::null_mut(), 20).is_ok());
        assert_eq!(tmr.period(), 5);
    }
}

#[cfg(test)]
mod mutex_sem_guard_tests {
    use aacos::error::OsError;
    use aacos::mutex::OsMutex;
    use aacos::sem::OsSem;
    use aacos::types::opt;

    #[test]
    fn mutex_pend_without_a_running_kernel_is_rejected() {
        let mut mtx = OsMutex::new();
        mtx.create("m").unwrap();
        assert_eq!(mtx.pend(0, opt::NONE).unwrap_err(), OsError::OsNotRunning);
    }

    #[test]
    fn sem_pend_without_a_running_kernel_is_rejected() {
        let mut sem = OsSem::new(0);
        sem.create(0, "s").unwrap();
        assert_eq!(sem.pend(0, opt::NONE).unwrap_err(), OsError::OsNotRunning);
    }

    #[test]
    fn sem_post_without_waiters_just_increments_count() {
        let mut sem = OsSem::new(0);
        sem.create(0, "s").unwrap();
        assert_eq!(sem.post(opt::NONE).unwrap(), 1);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn sem_reset_overrides_count_directly() {
        let mut sem = OsSem::new(0);
        sem.create(0, "s").unwrap();
        sem.reset(5).unwrap();
        assert_eq!(sem.count(), 5);
    }
}
