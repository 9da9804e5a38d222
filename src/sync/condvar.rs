//! Condition variable.
//!
//! Pairs with a mutex supplied per wait call: the wait atomically
//! releases the mutex, blocks, and re-acquires it before returning,
//! timeout included. Notifications are callable from interrupt context;
//! woken waiters re-compete for the mutex on resume.

use crate::critical::{critical_section, CriticalSection};
use crate::error::{Error, OsResult};
use crate::kernel;
use crate::sched;
use crate::sched::WaitList;
use crate::sync::mutex::{Mutex, OsMutex};
use crate::types::{OsTick, ThreadState, UnblockReason};

/// Condition variable control block
pub struct OsCondVar {
    /// Threads blocked on the condition, most urgent first
    wait_list: WaitList,
}

impl OsCondVar {
    pub const fn new() -> Self {
        OsCondVar {
            wait_list: WaitList::new(ThreadState::BlockedOnConditionVariable),
        }
    }

    /// Release `mutex`, wait for a notification, re-acquire `mutex`.
    ///
    /// # Returns
    /// * `Err(Error::Perm)` - caller does not own `mutex` with depth 1
    pub fn wait(&mut self, mutex: &mut OsMutex) -> OsResult<()> {
        self.wait_impl(mutex, None)
    }

    /// As [`wait`](Self::wait) with a deadline; the mutex is re-acquired
    /// before `Err(Error::TimedOut)` is returned.
    pub fn wait_until(&mut self, mutex: &mut OsMutex, deadline: OsTick) -> OsResult<()> {
        self.wait_impl(mutex, Some(deadline))
    }

    fn wait_impl(&mut self, mutex: &mut OsMutex, deadline: Option<OsTick>) -> OsResult<()> {
        let _cs = CriticalSection::enter();

        let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;
        if mutex.owner() != Some(cur) || mutex.nesting() != 1 {
            return Err(Error::Perm);
        }

        mutex.unlock()?;

        let wait_result = unsafe {
            match deadline {
                None => sched::block(&mut self.wait_list, None),
                Some(deadline) => sched::block_until(&mut self.wait_list, deadline, None),
            }
        };

        // re-lock even when the wait timed out
        let lock_result = mutex.lock();

        wait_result.and(lock_result)
    }

    /// Wake the most urgent waiter, if any. Callable from interrupt
    /// context.
    pub fn notify_one(&mut self) {
        critical_section(|_cs| {
            if let Some(waiter) = self.wait_list.head() {
                unsafe { sched::unblock(waiter, UnblockReason::UnblockRequest) };
            }
        })
    }

    /// Wake every waiter in priority order. Callable from interrupt
    /// context.
    pub fn notify_all(&mut self) {
        critical_section(|_cs| {
            while let Some(waiter) = self.wait_list.head() {
                unsafe { sched::unblock(waiter, UnblockReason::UnblockRequest) };
            }
        })
    }
}

impl Default for OsCondVar {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsCondVar {}
unsafe impl Sync for OsCondVar {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable condition variable handle for static storage
pub struct CondVar {
    inner: UnsafeCell<OsCondVar>,
}

unsafe impl Sync for CondVar {}
unsafe impl Send for CondVar {}

impl CondVar {
    pub const fn new() -> Self {
        CondVar {
            inner: UnsafeCell::new(OsCondVar::new()),
        }
    }

    pub fn wait(&self, mutex: &Mutex) -> OsResult<()> {
        unsafe { (*self.inner.get()).wait(&mut *mutex.raw()) }
    }

    pub fn wait_until(&self, mutex: &Mutex, deadline: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).wait_until(&mut *mutex.raw(), deadline) }
    }

    pub fn notify_one(&self) {
        unsafe { (*self.inner.get()).notify_one() }
    }

    pub fn notify_all(&self) {
        unsafe { (*self.inner.get()).notify_all() }
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}
