//! Mutex with selectable locking protocol.
//!
//! Three protocols are supported: plain locking, priority inheritance
//! and priority ceiling. Under the priority protocols a mutex links
//! itself into its owner's owned-mutex list and contributes to the
//! owner's boosted priority; under inheritance the boost propagates
//! through the chain of blocked owners.

use core::ptr::NonNull;

use crate::critical::critical_section;
use crate::error::{Error, OsResult};
use crate::kernel;
use crate::sched;
use crate::sched::WaitList;
use crate::thread::Tcb;
use crate::types::{OsNestingCtr, OsPrio, OsTick, ThreadState, UnblockReason};

/// Locking protocol of a mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain lock, no priority bookkeeping
    None,
    /// Owner inherits the top waiter's effective priority, transitively
    PriorityInheritance,
    /// Owner runs at the ceiling priority while holding the lock
    PriorityCeiling,
}

/// How a lock attempt may wait for the owner
#[derive(Clone, Copy)]
enum LockMode {
    TryOnce,
    Block,
    BlockUntil(OsTick),
}

/// Mutex control block
pub struct OsMutex {
    /// Threads blocked on the lock, most urgent first
    wait_list: WaitList,
    protocol: Protocol,
    /// Whether the owner may lock again instead of deadlocking
    recursive: bool,
    /// Lock depth; 0 exactly when unowned
    nesting: OsNestingCtr,
    /// Ceiling priority, meaningful only for `PriorityCeiling`
    ceiling: OsPrio,
    owner: Option<NonNull<Tcb>>,
    /// Link in the owner's owned-mutex list
    next_owned: Option<NonNull<OsMutex>>,
}

impl OsMutex {
    /// Create a mutex
    pub const fn new(protocol: Protocol, recursive: bool) -> Self {
        OsMutex {
            wait_list: WaitList::new(ThreadState::BlockedOnMutex),
            protocol,
            recursive,
            nesting: 0,
            ceiling: 0,
            owner: None,
            next_owned: None,
        }
    }

    /// Create a priority-ceiling mutex
    pub const fn with_ceiling(ceiling: OsPrio, recursive: bool) -> Self {
        OsMutex {
            wait_list: WaitList::new(ThreadState::BlockedOnMutex),
            protocol: Protocol::PriorityCeiling,
            recursive,
            nesting: 0,
            ceiling,
            owner: None,
            next_owned: None,
        }
    }

    /// Acquire the lock, blocking while another thread owns it.
    ///
    /// # Returns
    /// * `Err(Error::DeadLk)` - caller already owns this non-recursive mutex
    /// * `Err(Error::Again)` - recursion counter saturated
    /// * `Err(Error::Inval)` - caller's priority exceeds the ceiling
    pub fn lock(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;
            unsafe { self.acquire_for(cur, LockMode::Block) }
        })
    }

    /// Acquire the lock without blocking.
    ///
    /// # Returns
    /// * `Err(Error::Again)` - another thread owns the lock
    pub fn try_lock(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;
            unsafe { self.acquire_for(cur, LockMode::TryOnce) }
        })
    }

    /// Acquire the lock with a deadline on the tick clock.
    ///
    /// # Returns
    /// * `Err(Error::TimedOut)` - the deadline passed first
    pub fn try_lock_until(&mut self, deadline: OsTick) -> OsResult<()> {
        critical_section(|_cs| {
            let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;
            unsafe { self.acquire_for(cur, LockMode::BlockUntil(deadline)) }
        })
    }

    /// Acquire the lock, waiting for at least `duration` ticks.
    pub fn try_lock_for(&mut self, duration: OsTick) -> OsResult<()> {
        self.try_lock_until(crate::time::now() + duration + 1)
    }

    /// Release the lock.
    ///
    /// The final release recomputes the caller's boosted priority and
    /// hands ownership to the most urgent waiter.
    ///
    /// # Returns
    /// * `Err(Error::Perm)` - caller does not own the lock
    pub fn unlock(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;
            unsafe { self.release_for(cur) }
        })
    }

    /// Whether any thread currently owns the lock
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    #[inline]
    pub(crate) fn owner(&self) -> Option<NonNull<Tcb>> {
        self.owner
    }

    #[inline]
    pub(crate) fn nesting(&self) -> OsNestingCtr {
        self.nesting
    }

    #[inline]
    fn participates(&self) -> bool {
        self.protocol != Protocol::None
    }

    /// Priority this mutex imposes on its owner
    fn boost_value(&self) -> OsPrio {
        match self.protocol {
            Protocol::PriorityInheritance => self
                .wait_list
                .head()
                .map(|waiter| unsafe { waiter.as_ref().effective_prio() })
                .unwrap_or(0),
            Protocol::PriorityCeiling => self.ceiling,
            Protocol::None => 0,
        }
    }

    unsafe fn acquire_for(&mut self, cur: NonNull<Tcb>, mode: LockMode) -> OsResult<()> {
        unsafe {
            if self.protocol == Protocol::PriorityCeiling
                && self.ceiling < cur.as_ref().effective_prio()
            {
                return Err(Error::Inval);
            }

            if self.owner.is_none() {
                self.take(cur);
                return Ok(());
            }

            if self.owner == Some(cur) {
                if !self.recursive {
                    return Err(Error::DeadLk);
                }
                self.nesting = self.nesting.checked_add(1).ok_or(Error::Again)?;
                return Ok(());
            }

            if matches!(mode, LockMode::TryOnce) {
                return Err(Error::Again);
            }

            if self.protocol == Protocol::PriorityInheritance {
                (*cur.as_ptr()).blocking_mutex = Some(NonNull::from(&mut *self));
                if let Some(owner) = self.owner {
                    reboost_chain(owner, cur.as_ref().effective_prio());
                }
            }

            let result = match mode {
                LockMode::Block => sched::block(&mut self.wait_list, Some(lock_abandoned)),
                LockMode::BlockUntil(deadline) => {
                    sched::block_until(&mut self.wait_list, deadline, Some(lock_abandoned))
                }
                LockMode::TryOnce => Err(Error::Again),
            };

            // On timeout the unblock functor has dropped this thread's
            // boost contribution already; the elapsed-deadline path never
            // blocked, so undo it here instead.
            if result.is_err() {
                lock_abandoned(&mut *cur.as_ptr());
            }

            result
        }
    }

    unsafe fn take(&mut self, cur: NonNull<Tcb>) {
        self.owner = Some(cur);
        self.nesting = 1;

        if self.participates() {
            unsafe {
                owned_list_push(&mut *cur.as_ptr(), NonNull::from(&mut *self));
                // ceiling protocol boosts the owner immediately
                update_boosted_priority(cur, 0);
            }
        }
    }

    unsafe fn release_for(&mut self, cur: NonNull<Tcb>) -> OsResult<()> {
        if self.owner != Some(cur) {
            return Err(Error::Perm);
        }

        if self.nesting > 1 {
            self.nesting -= 1;
            return Ok(());
        }

        self.nesting = 0;

        unsafe {
            if self.participates() {
                owned_list_remove(&mut *cur.as_ptr(), NonNull::from(&mut *self));
                update_boosted_priority(cur, 0);
            }

            match self.wait_list.head() {
                Some(waiter) => {
                    self.owner = Some(waiter);
                    self.nesting = 1;

                    let w = &mut *waiter.as_ptr();
                    w.blocking_mutex = None;
                    if self.participates() {
                        owned_list_push(w, NonNull::from(&mut *self));
                    }

                    sched::unblock(waiter, UnblockReason::UnblockRequest);

                    if self.participates() {
                        // inherits the remaining waiters' urgency at once
                        update_boosted_priority(waiter, 0);
                    }
                }
                None => self.owner = None,
            }
        }

        Ok(())
    }
}

unsafe impl Send for OsMutex {}
unsafe impl Sync for OsMutex {}

/// Recompute a thread's boosted priority.
///
/// `boosted` becomes the maximum of `initial` and the boost imposed by
/// every priority-protocol mutex the thread owns; the thread is then
/// repositioned on whatever list holds it. This is the only writer of
/// the boosted priority.
///
/// # Safety
/// Interrupts must be masked; `tcb` must be valid.
pub(crate) unsafe fn update_boosted_priority(tcb: NonNull<Tcb>, initial: OsPrio) {
    unsafe {
        let t = &mut *tcb.as_ptr();
        let old_prio = t.effective_prio();

        let mut boost = initial;
        let mut cursor = t.owned_mutexes;
        while let Some(mutex) = cursor {
            let m = mutex.as_ref();
            if m.boost_value() > boost {
                boost = m.boost_value();
            }
            cursor = m.next_owned;
        }

        t.boosted_prio = boost;
        sched::reposition(tcb, old_prio, false);
    }
}

/// Propagate a boost along the chain `owner → owner.blocking_mutex.owner
/// → …`, stopping as soon as a hop's effective priority is unchanged.
///
/// `initial` carries the effective priority of a waiter that is not yet
/// enqueued on the first mutex's wait list.
///
/// # Safety
/// Interrupts must be masked; the chain must be acyclic, which the
/// lock/unlock rules guarantee.
unsafe fn reboost_chain(owner: NonNull<Tcb>, initial: OsPrio) {
    let mut owner = owner;
    let mut initial = initial;

    loop {
        unsafe {
            let old_prio = owner.as_ref().effective_prio();
            update_boosted_priority(owner, initial);
            if owner.as_ref().effective_prio() == old_prio {
                break;
            }

            let Some(next_mutex) = owner.as_ref().blocking_mutex else {
                break;
            };
            let next = next_mutex.as_ref();
            if next.protocol != Protocol::PriorityInheritance {
                break;
            }
            let Some(next_owner) = next.owner else {
                break;
            };

            owner = next_owner;
            initial = 0;
        }
    }
}

/// Unblock functor of a mutex wait: drops the abandoned waiter's boost
/// contribution when its wait ends without acquiring the lock. The
/// hand-off path clears `blocking_mutex` first, making this a no-op.
fn lock_abandoned(tcb: &mut Tcb) {
    if let Some(mutex) = tcb.blocking_mutex.take() {
        unsafe {
            if let Some(owner) = mutex.as_ref().owner {
                reboost_chain(owner, 0);
            }
        }
    }
}

/// Push a mutex onto its owner's owned-mutex list.
///
/// # Safety
/// Interrupts must be masked; `mutex` must not already be on a list.
unsafe fn owned_list_push(owner: &mut Tcb, mut mutex: NonNull<OsMutex>) {
    unsafe {
        mutex.as_mut().next_owned = owner.owned_mutexes;
    }
    owner.owned_mutexes = Some(mutex);
}

/// Remove a mutex from its owner's owned-mutex list.
///
/// # Safety
/// Interrupts must be masked; `mutex` must be on `owner`'s list.
unsafe fn owned_list_remove(owner: &mut Tcb, mutex: NonNull<OsMutex>) {
    unsafe {
        if owner.owned_mutexes == Some(mutex) {
            owner.owned_mutexes = mutex.as_ref().next_owned;
        } else {
            let mut cursor = owner.owned_mutexes;
            while let Some(m) = cursor {
                let next = m.as_ref().next_owned;
                if next == Some(mutex) {
                    (*m.as_ptr()).next_owned = mutex.as_ref().next_owned;
                    break;
                }
                cursor = next;
            }
        }

        (*mutex.as_ptr()).next_owned = None;
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable mutex handle for static storage
pub struct Mutex {
    inner: UnsafeCell<OsMutex>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub const fn new(protocol: Protocol, recursive: bool) -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::new(protocol, recursive)),
        }
    }

    pub const fn with_ceiling(ceiling: OsPrio, recursive: bool) -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::with_ceiling(ceiling, recursive)),
        }
    }

    pub fn lock(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).lock() }
    }

    pub fn try_lock(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).try_lock() }
    }

    pub fn try_lock_until(&self, deadline: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).try_lock_until(deadline) }
    }

    pub fn try_lock_for(&self, duration: OsTick) -> OsResult<()> {
        unsafe { (*self.inner.get()).try_lock_for(duration) }
    }

    pub fn unlock(&self) -> OsResult<()> {
        unsafe { (*self.inner.get()).unlock() }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        unsafe { (*self.inner.get()).is_locked() }
    }

    pub(crate) fn raw(&self) -> *mut OsMutex {
        self.inner.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb_with_prio(prio: OsPrio) -> Tcb {
        let mut tcb = Tcb::new();
        tcb.base_prio = prio;
        tcb
    }

    #[test]
    fn lock_unlock_round_trip() {
        let mut tcb = tcb_with_prio(5);
        let cur = NonNull::from(&mut tcb);
        let mut mutex = OsMutex::new(Protocol::None, false);

        unsafe {
            mutex.acquire_for(cur, LockMode::TryOnce).unwrap();
            assert!(mutex.is_locked());
            assert_eq!(mutex.nesting(), 1);

            mutex.release_for(cur).unwrap();
        }
        assert!(!mutex.is_locked());
        assert_eq!(mutex.nesting(), 0);
        assert_eq!(tcb.owned_mutexes, None);
    }

    #[test]
    fn relock_of_non_recursive_deadlocks() {
        let mut tcb = tcb_with_prio(5);
        let cur = NonNull::from(&mut tcb);
        let mut mutex = OsMutex::new(Protocol::None, false);

        unsafe {
            mutex.acquire_for(cur, LockMode::Block).unwrap();
            assert_eq!(mutex.acquire_for(cur, LockMode::Block), Err(Error::DeadLk));
        }
    }

    #[test]
    fn recursive_lock_counts_depth() {
        let mut tcb = tcb_with_prio(5);
        let cur = NonNull::from(&mut tcb);
        let mut mutex = OsMutex::new(Protocol::None, true);

        unsafe {
            mutex.acquire_for(cur, LockMode::Block).unwrap();
            mutex.acquire_for(cur, LockMode::Block).unwrap();
            mutex.acquire_for(cur, LockMode::Block).unwrap();
            assert_eq!(mutex.nesting(), 3);

            mutex.release_for(cur).unwrap();
            mutex.release_for(cur).unwrap();
            assert!(mutex.is_locked());

            mutex.release_for(cur).unwrap();
            assert!(!mutex.is_locked());
        }
    }

    #[test]
    fn unlock_by_non_owner_rejected() {
        let mut owner = tcb_with_prio(5);
        let mut other = tcb_with_prio(6);
        let mut mutex = OsMutex::new(Protocol::None, false);

        unsafe {
            mutex
                .acquire_for(NonNull::from(&mut owner), LockMode::Block)
                .unwrap();
            assert_eq!(
                mutex.release_for(NonNull::from(&mut other)),
                Err(Error::Perm)
            );
        }
    }

    #[test]
    fn ceiling_rejects_more_urgent_locker() {
        let mut tcb = tcb_with_prio(20);
        let cur = NonNull::from(&mut tcb);
        let mut mutex = OsMutex::with_ceiling(10, false);

        unsafe {
            assert_eq!(mutex.acquire_for(cur, LockMode::Block), Err(Error::Inval));
        }
    }

    #[test]
    fn ceiling_boosts_owner_while_held() {
        let mut tcb = tcb_with_prio(3);
        let cur = NonNull::from(&mut tcb);
        let mut mutex = OsMutex::with_ceiling(10, false);

        unsafe {
            mutex.acquire_for(cur, LockMode::Block).unwrap();
            assert_eq!(tcb.effective_prio(), 10);

            mutex.release_for(cur).unwrap();
        }
        assert_eq!(tcb.effective_prio(), 3);
        assert_eq!(tcb.boosted_prio, 0);
    }

    #[test]
    fn boost_covers_every_owned_mutex() {
        let mut tcb = tcb_with_prio(1);
        let cur = NonNull::from(&mut tcb);
        let mut low = OsMutex::with_ceiling(4, false);
        let mut high = OsMutex::with_ceiling(9, false);

        unsafe {
            low.acquire_for(cur, LockMode::Block).unwrap();
            high.acquire_for(cur, LockMode::Block).unwrap();
            assert_eq!(tcb.effective_prio(), 9);

            high.release_for(cur).unwrap();
            assert_eq!(tcb.effective_prio(), 4);

            low.release_for(cur).unwrap();
        }
        assert_eq!(tcb.effective_prio(), 1);
    }
}
