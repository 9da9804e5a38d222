//! Counting semaphore.
//!
//! The elemental blocking primitive: every other blocking wait in the
//! kernel (join included) is expressed through it. `post` is callable
//! from interrupt context.

use crate::critical::critical_section;
use crate::error::{Error, OsResult};
use crate::sched;
use crate::sched::WaitList;
use crate::types::{OsSemCtr, OsTick, ThreadState};

/// How an acquire attempt may wait on the counter
#[derive(Clone, Copy)]
enum AcquireMode {
    /// Fail with `Again` instead of blocking
    TryOnce,
    /// Block until posted
    Block,
    /// Block until posted or the deadline passes
    BlockUntil(OsTick),
}

/// Counting semaphore with an optional maximum value
pub struct OsSem {
    /// Threads blocked on the counter, most urgent first
    wait_list: WaitList,
    /// Current value
    value: OsSemCtr,
    /// Value that `post` refuses to exceed
    max_value: OsSemCtr,
}

impl OsSem {
    /// Create a semaphore; an initial value above `max_value` is clamped.
    pub const fn new(value: OsSemCtr, max_value: OsSemCtr) -> Self {
        OsSem {
            wait_list: WaitList::new(ThreadState::BlockedOnSemaphore),
            value: if value <= max_value { value } else { max_value },
            max_value,
        }
    }

    /// Create a semaphore with no practical maximum
    pub const fn counting(value: OsSemCtr) -> Self {
        Self::new(value, OsSemCtr::MAX)
    }

    /// Post (signal) the semaphore.
    ///
    /// Hands a "ticket" directly to the most urgent waiter when one
    /// exists, leaving the value untouched; otherwise increments the
    /// value. Callable from interrupt context.
    ///
    /// # Returns
    /// * `Err(Error::Overflow)` - the value is already at the maximum
    pub fn post(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            if self.value == self.max_value {
                return Err(Error::Overflow);
            }

            match self.wait_list.head() {
                Some(waiter) => unsafe {
                    sched::unblock(waiter, crate::types::UnblockReason::UnblockRequest);
                },
                None => self.value += 1,
            }

            Ok(())
        })
    }

    /// Wait on the semaphore, blocking until a post arrives.
    pub fn wait(&mut self) -> OsResult<()> {
        self.acquire(AcquireMode::Block)
    }

    /// Non-blocking wait.
    ///
    /// # Returns
    /// * `Err(Error::Again)` - the value is zero
    pub fn try_wait(&mut self) -> OsResult<()> {
        self.acquire(AcquireMode::TryOnce)
    }

    /// Wait with a deadline on the tick clock.
    ///
    /// # Returns
    /// * `Err(Error::TimedOut)` - the deadline passed first
    pub fn try_wait_until(&mut self, deadline: OsTick) -> OsResult<()> {
        self.acquire(AcquireMode::BlockUntil(deadline))
    }

    /// Wait for at least `duration` ticks.
    ///
    /// The extra tick rounds up, guaranteeing the full duration despite
    /// tick granularity.
    pub fn try_wait_for(&mut self, duration: OsTick) -> OsResult<()> {
        self.try_wait_until(crate::time::now() + duration + 1)
    }

    /// Current value
    #[inline]
    pub fn value(&self) -> OsSemCtr {
        self.value
    }

    fn acquire(&mut self, mode: AcquireMode) -> OsResult<()> {
        critical_section(|_cs| {
            if self.value > 0 {
                self.value -= 1;
                return Ok(());
            }

            match mode {
                AcquireMode::TryOnce => Err(Error::Again),
                // a post that wakes us transfers the ticket without
                // touching the value
                AcquireMode::Block => unsafe { sched::block(&mut self.wait_list, None) },
                AcquireMode::BlockUntil(deadline) => unsafe {
                    sched::block_until(&mut self.wait_list, deadline, None)
                },
            }
        })
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::counting(0)
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable semaphore handle for static storage
pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new(value: OsSemCtr, max_value: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new(value, max_value)),
        }
    }

    pub const fn counting(value: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::counting(value)),
        }
    }

    pub fn post(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).post() }
    }

    pub fn wait(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).wait() }
    }

    pub fn try_wait(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).try_wait() }
    }

    pub fn try_wait_until(&self, deadline: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).try_wait_until(deadline) }
    }

    pub fn try_wait_for(&self, duration: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).try_wait_for(duration) }
    }

    #[inline]
    pub fn value(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).value() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::counting(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_value_clamped_to_max() {
        let sem = OsSem::new(10, 3);
        assert_eq!(sem.value(), 3);
    }

    #[test]
    fn post_then_try_wait_balances() {
        let mut sem = OsSem::counting(0);

        assert_eq!(sem.try_wait(), Err(Error::Again));

        sem.post().unwrap();
        sem.post().unwrap();
        assert_eq!(sem.value(), 2);

        sem.try_wait().unwrap();
        sem.try_wait().unwrap();
        assert_eq!(sem.value(), 0);
        assert_eq!(sem.try_wait(), Err(Error::Again));
    }

    #[test]
    fn post_at_max_overflows() {
        let mut sem = OsSem::new(1, 1);
        assert_eq!(sem.post(), Err(Error::Overflow));

        sem.try_wait().unwrap();
        sem.post().unwrap();
        assert_eq!(sem.post(), Err(Error::Overflow));
    }

    #[test]
    fn saturating_max_accepts_posts() {
        let mut sem = OsSem::new(OsSemCtr::MAX - 1, OsSemCtr::MAX);
        sem.post().unwrap();
        assert_eq!(sem.value(), OsSemCtr::MAX);
        assert_eq!(sem.post(), Err(Error::Overflow));
    }
}
