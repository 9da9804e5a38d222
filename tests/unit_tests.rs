//! Unit tests for core kernel modules.
//!
//! These run on the host (not the embedded target) to verify the core
//! data structures and state machines; context switching is stubbed out.

mod prio_tests {
    use corten::config::CFG_PRIO_IDLE;
    use corten::prio::PrioTable;

    #[test]
    fn empty_table_falls_back_to_idle() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.highest(), CFG_PRIO_IDLE);
    }

    #[test]
    fn higher_number_is_more_urgent() {
        let mut table = PrioTable::new();

        table.insert(20);
        table.insert(5);
        table.insert(130);
        table.insert(65);

        assert_eq!(table.highest(), 130);

        table.remove(130);
        assert_eq!(table.highest(), 65);

        table.remove(65);
        assert_eq!(table.highest(), 20);

        table.remove(20);
        assert_eq!(table.highest(), 5);

        table.remove(5);
        assert!(table.is_empty());
    }

    #[test]
    fn full_range() {
        let mut table = PrioTable::new();

        for prio in 0..=255u8 {
            table.insert(prio);
        }
        assert_eq!(table.highest(), 255);

        for prio in (0..=255u8).rev() {
            assert_eq!(table.highest(), prio);
            table.remove(prio);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn word_boundaries() {
        let mut table = PrioTable::new();

        table.insert(31);
        table.insert(32);
        assert_eq!(table.highest(), 32);

        table.remove(32);
        assert_eq!(table.highest(), 31);

        table.insert(255);
        table.insert(224);
        table.remove(255);
        assert_eq!(table.highest(), 224);
    }
}

mod ready_list_tests {
    use core::ptr::NonNull;

    use corten::sched::ReadyList;
    use corten::Tcb;

    #[test]
    fn fifo_within_band() {
        let mut a = Tcb::new();
        let mut b = Tcb::new();
        let mut c = Tcb::new();
        let mut band = ReadyList::new();

        unsafe {
            band.push_tail(NonNull::from(&mut a));
            band.push_tail(NonNull::from(&mut b));
            band.push_tail(NonNull::from(&mut c));
        }

        assert_eq!(band.head(), Some(NonNull::from(&mut a)));
        assert_eq!(band.tail(), Some(NonNull::from(&mut c)));
        assert!(band.has_contenders());
    }

    #[test]
    fn rotation_cycles_the_band() {
        let mut a = Tcb::new();
        let mut b = Tcb::new();
        let mut band = ReadyList::new();

        unsafe {
            band.push_tail(NonNull::from(&mut a));
            band.push_tail(NonNull::from(&mut b));

            band.rotate();
            assert_eq!(band.head(), Some(NonNull::from(&mut b)));

            band.rotate();
            assert_eq!(band.head(), Some(NonNull::from(&mut a)));
        }
    }

    #[test]
    fn push_head_runs_next() {
        let mut a = Tcb::new();
        let mut b = Tcb::new();
        let mut band = ReadyList::new();

        unsafe {
            band.push_tail(NonNull::from(&mut a));
            band.push_head(NonNull::from(&mut b));
        }

        assert_eq!(band.head(), Some(NonNull::from(&mut b)));
        assert_eq!(band.tail(), Some(NonNull::from(&mut a)));
    }

    #[test]
    fn remove_from_middle() {
        let mut a = Tcb::new();
        let mut b = Tcb::new();
        let mut c = Tcb::new();
        let mut band = ReadyList::new();

        unsafe {
            band.push_tail(NonNull::from(&mut a));
            band.push_tail(NonNull::from(&mut b));
            band.push_tail(NonNull::from(&mut c));

            band.remove(NonNull::from(&mut b));
        }

        assert_eq!(band.head(), Some(NonNull::from(&mut a)));
        assert_eq!(band.tail(), Some(NonNull::from(&mut c)));
        assert_eq!(a.run_next, Some(NonNull::from(&mut c)));
        assert_eq!(b.run_next, None);
        assert_eq!(b.run_prev, None);
    }
}

mod wait_list_tests {
    use core::ptr::NonNull;

    use corten::sched::WaitList;
    use corten::types::ThreadState;
    use corten::Tcb;

    fn tcb_with_prio(prio: u8) -> Tcb {
        let mut tcb = Tcb::new();
        tcb.base_prio = prio;
        tcb
    }

    #[test]
    fn most_urgent_waiter_first() {
        let mut low = tcb_with_prio(2);
        let mut high = tcb_with_prio(9);
        let mut mid = tcb_with_prio(5);
        let mut list = WaitList::new(ThreadState::BlockedOnSemaphore);

        unsafe {
            list.insert(NonNull::from(&mut low), false);
            list.insert(NonNull::from(&mut high), false);
            list.insert(NonNull::from(&mut mid), false);
        }

        assert_eq!(list.head(), Some(NonNull::from(&mut high)));
        assert_eq!(high.wait_next, Some(NonNull::from(&mut mid)));
        assert_eq!(mid.wait_next, Some(NonNull::from(&mut low)));
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut first = tcb_with_prio(5);
        let mut second = tcb_with_prio(5);
        let mut third = tcb_with_prio(5);
        let mut list = WaitList::new(ThreadState::BlockedOnSemaphore);

        unsafe {
            list.insert(NonNull::from(&mut first), false);
            list.insert(NonNull::from(&mut second), false);
            list.insert(NonNull::from(&mut third), false);
        }

        assert_eq!(list.head(), Some(NonNull::from(&mut first)));
        assert_eq!(first.wait_next, Some(NonNull::from(&mut second)));
        assert_eq!(second.wait_next, Some(NonNull::from(&mut third)));
    }

    #[test]
    fn ahead_of_equals_takes_the_band_head() {
        let mut resident = tcb_with_prio(5);
        let mut demoted = tcb_with_prio(5);
        let mut list = WaitList::new(ThreadState::BlockedOnMutex);

        unsafe {
            list.insert(NonNull::from(&mut resident), false);
            list.insert(NonNull::from(&mut demoted), true);
        }

        assert_eq!(list.head(), Some(NonNull::from(&mut demoted)));
    }

    #[test]
    fn insert_stamps_state_and_backpointer() {
        let mut tcb = tcb_with_prio(4);
        let mut list = WaitList::new(ThreadState::BlockedOnConditionVariable);

        unsafe {
            list.insert(NonNull::from(&mut tcb), false);
        }
        assert_eq!(tcb.state, ThreadState::BlockedOnConditionVariable);
        assert_eq!(tcb.wait_list, Some(NonNull::from(&mut list)));

        unsafe {
            list.remove(NonNull::from(&mut tcb));
        }
        assert_eq!(tcb.wait_list, None);
        assert!(list.is_empty());
    }

    #[test]
    fn reposition_follows_boost() {
        let mut boosted = tcb_with_prio(2);
        let mut other = tcb_with_prio(5);
        let mut list = WaitList::new(ThreadState::BlockedOnSemaphore);

        unsafe {
            list.insert(NonNull::from(&mut boosted), false);
            list.insert(NonNull::from(&mut other), false);
        }
        assert_eq!(list.head(), Some(NonNull::from(&mut other)));

        boosted.boosted_prio = 9;
        unsafe {
            list.reposition(NonNull::from(&mut boosted), false);
        }
        assert_eq!(list.head(), Some(NonNull::from(&mut boosted)));
    }
}

mod sem_tests {
    use corten::error::Error;
    use corten::sem::OsSem;

    #[test]
    fn satisfied_wait_wins_over_elapsed_deadline() {
        let mut sem = OsSem::new(1, 1);
        assert_eq!(sem.try_wait_until(0), Ok(()));
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn elapsed_deadline_times_out_immediately() {
        let mut sem = OsSem::counting(0);
        assert_eq!(sem.try_wait_until(0), Err(Error::TimedOut));
    }

    #[test]
    fn balance_over_a_run() {
        let mut sem = OsSem::new(2, 10);

        let mut successful_waits = 0;
        let mut successful_posts = 0;

        for _ in 0..2 {
            sem.try_wait().unwrap();
            successful_waits += 1;
        }
        for _ in 0..5 {
            sem.post().unwrap();
            successful_posts += 1;
        }
        for _ in 0..3 {
            sem.try_wait().unwrap();
            successful_waits += 1;
        }

        // successful waits = initial + posts - final value
        assert_eq!(successful_waits, 2 + successful_posts - sem.value());
    }
}

mod error_tests {
    use corten::error::Error;

    #[test]
    fn errno_values() {
        assert_eq!(Error::Perm.code(), 1);
        assert_eq!(Error::Intr.code(), 4);
        assert_eq!(Error::Again.code(), 11);
        assert_eq!(Error::Inval.code(), 22);
        assert_eq!(Error::DeadLk.code(), 35);
        assert_eq!(Error::Overflow.code(), 75);
        assert_eq!(Error::TimedOut.code(), 110);
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(Error::TimedOut, Error::TimedOut);
        assert_ne!(Error::TimedOut, Error::Again);

        let err = Error::DeadLk;
        let _ = format!("{:?}", err);
    }
}

mod types_tests {
    use corten::types::*;

    #[test]
    fn blocked_states() {
        assert!(!ThreadState::New.is_blocked());
        assert!(!ThreadState::Runnable.is_blocked());
        assert!(!ThreadState::Terminated.is_blocked());

        assert!(ThreadState::Sleeping.is_blocked());
        assert!(ThreadState::BlockedOnSemaphore.is_blocked());
        assert!(ThreadState::BlockedOnMutex.is_blocked());
        assert!(ThreadState::BlockedOnConditionVariable.is_blocked());
        assert!(ThreadState::WaitingForSignal.is_blocked());
        assert!(ThreadState::Suspended.is_blocked());
    }

    #[test]
    fn effective_priority_is_max_of_base_and_boost() {
        let mut tcb = corten::Tcb::new();

        tcb.base_prio = 5;
        assert_eq!(tcb.effective_prio(), 5);

        tcb.boosted_prio = 9;
        assert_eq!(tcb.effective_prio(), 9);

        tcb.boosted_prio = 3;
        assert_eq!(tcb.effective_prio(), 5);
    }
}

mod signal_tests {
    use corten::error::Error;
    use corten::SigSet;

    #[test]
    fn mask_round_trip() {
        let mut set = SigSet::empty();

        set.add(3).unwrap();
        set.add(7).unwrap();
        assert_eq!(set.bits(), (1 << 3) | (1 << 7));

        set.remove(3).unwrap();
        assert_eq!(set.bits(), 1 << 7);
    }

    #[test]
    fn out_of_range_signal_rejected() {
        let mut set = SigSet::empty();
        assert_eq!(set.add(32), Err(Error::Inval));
        assert_eq!(set.remove(255), Err(Error::Inval));
        assert!(!set.contains(32));
    }

    #[test]
    fn full_set_contains_everything() {
        let set = SigSet::full();
        for signal in 0..=31 {
            assert!(set.contains(signal));
        }
        assert_eq!(set.lowest_set(), Some(0));
    }
}

mod config_tests {
    use corten::config::*;

    #[test]
    fn config_values() {
        assert_eq!(CFG_PRIO_LEVELS, 256, "priorities are 0..=255");
        assert_eq!(CFG_PRIO_IDLE, 0, "idle must be least urgent");

        assert!(CFG_STK_SIZE_MIN >= 32, "stack too small");

        assert!(CFG_TICK_RATE_HZ >= 10, "tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10_000, "tick rate too fast");

        assert!(CFG_TIME_QUANTA_DEFAULT > 0);
        assert!(CFG_TICK_WHEEL_SIZE.is_power_of_two());
    }
}
