//! Per-thread asynchronous signals.
//!
//! Each thread carries a 32-bit pending mask. Generating a signal sets a
//! bit and wakes the target when it is waiting on an intersecting mask;
//! waiting accepts (clears and returns) the lowest matching pending
//! signal. `generate` is callable from interrupt context.

use core::ptr::NonNull;

use crate::critical::{critical_section, CriticalSection};
use crate::error::{Error, OsResult};
use crate::kernel;
use crate::sched;
use crate::sched::WaitList;
use crate::thread::Tcb;
use crate::types::{OsTick, ThreadState, UnblockReason};

/// Set of signal numbers 0..=31
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigSet(u32);

impl SigSet {
    /// Set with no signals
    pub const fn empty() -> Self {
        SigSet(0)
    }

    /// Set with every signal
    pub const fn full() -> Self {
        SigSet(u32::MAX)
    }

    /// Set from a raw bit mask
    pub const fn from_bits(bits: u32) -> Self {
        SigSet(bits)
    }

    /// Raw bit mask
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Add a signal to the set
    ///
    /// # Returns
    /// * `Err(Error::Inval)` - signal number out of range
    pub fn add(&mut self, signal: u8) -> OsResult<()> {
        if signal > 31 {
            return Err(Error::Inval);
        }
        self.0 |= 1 << signal;
        Ok(())
    }

    /// Remove a signal from the set
    ///
    /// # Returns
    /// * `Err(Error::Inval)` - signal number out of range
    pub fn remove(&mut self, signal: u8) -> OsResult<()> {
        if signal > 31 {
            return Err(Error::Inval);
        }
        self.0 &= !(1 << signal);
        Ok(())
    }

    /// Whether the set contains `signal`
    #[inline]
    pub fn contains(self, signal: u8) -> bool {
        signal <= 31 && (self.0 & (1 << signal)) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Signals present in both sets
    #[inline]
    pub fn intersection(self, other: SigSet) -> SigSet {
        SigSet(self.0 & other.0)
    }

    /// Lowest-numbered signal in the set
    #[inline]
    pub fn lowest_set(self) -> Option<u8> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as u8)
        }
    }
}

impl Default for SigSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// How a signal wait may block
#[derive(Clone, Copy)]
enum WaitMode {
    TryOnce,
    Block,
    BlockUntil(OsTick),
}

/// Generate a signal for `target`.
///
/// Sets the pending bit and unblocks the target when it is waiting on a
/// mask containing a now-pending signal. Callable from interrupt context.
///
/// # Returns
/// * `Err(Error::Inval)` - signal number out of range
pub fn generate(target: NonNull<Tcb>, signal: u8) -> OsResult<()> {
    if signal > 31 {
        return Err(Error::Inval);
    }

    critical_section(|_cs| unsafe {
        let t = &mut *target.as_ptr();
        t.sig_pending.add(signal)?;

        if t.state == ThreadState::WaitingForSignal {
            if let Some(waited) = t.sig_waiting {
                if !waited.as_ref().intersection(t.sig_pending).is_empty() {
                    sched::unblock(target, UnblockReason::UnblockRequest);
                }
            }
        }

        Ok(())
    })
}

/// Snapshot of the calling thread's pending signal set
pub fn pending_set() -> SigSet {
    critical_section(|_cs| {
        kernel::tcb_cur_ptr()
            .map(|tcb| unsafe { tcb.as_ref().sig_pending })
            .unwrap_or(SigSet::empty())
    })
}

/// Accept (clear) one pending signal of the calling thread.
///
/// # Returns
/// * `Err(Error::Inval)` - out of range, or the signal is not pending
pub fn accept(signal: u8) -> OsResult<()> {
    critical_section(|_cs| unsafe {
        let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;
        accept_on(&mut *cur.as_ptr(), signal)
    })
}

/// Wait until a signal from `mask` is pending, accept the lowest one and
/// return its number.
pub fn wait(mask: &SigSet) -> OsResult<u8> {
    wait_impl(mask, WaitMode::Block)
}

/// Non-blocking wait.
///
/// # Returns
/// * `Err(Error::Again)` - no signal from `mask` is pending
pub fn try_wait(mask: &SigSet) -> OsResult<u8> {
    wait_impl(mask, WaitMode::TryOnce)
}

/// Wait with a deadline on the tick clock.
///
/// # Returns
/// * `Err(Error::TimedOut)` - no matching signal arrived in time
pub fn try_wait_until(mask: &SigSet, deadline: OsTick) -> OsResult<u8> {
    wait_impl(mask, WaitMode::BlockUntil(deadline))
}

/// Wait for at least `duration` ticks.
pub fn try_wait_for(mask: &SigSet, duration: OsTick) -> OsResult<u8> {
    try_wait_until(mask, crate::time::now() + duration + 1)
}

fn wait_impl(mask: &SigSet, mode: WaitMode) -> OsResult<u8> {
    let _cs = CriticalSection::enter();

    let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;
    let tcb = unsafe { &mut *cur.as_ptr() };

    let mut hit = mask.intersection(tcb.sig_pending);

    if hit.is_empty() {
        if matches!(mode, WaitMode::TryOnce) {
            return Err(Error::Again);
        }

        // The list lives on this frame; every wakeup path removes the
        // thread from it before this function resumes.
        let mut waiting_list = WaitList::new(ThreadState::WaitingForSignal);
        let mut snapshot = SigSet::empty();

        tcb.sig_waiting = Some(NonNull::from(mask));
        tcb.sig_snapshot = &mut snapshot;

        let result = unsafe {
            match mode {
                WaitMode::Block => sched::block(&mut waiting_list, Some(signal_wait_unblock)),
                WaitMode::BlockUntil(deadline) => {
                    sched::block_until(&mut waiting_list, deadline, Some(signal_wait_unblock))
                }
                WaitMode::TryOnce => Err(Error::Again),
            }
        };

        if let Err(err) = result {
            // the elapsed-deadline path never blocked, so the unblock
            // functor did not run
            tcb.sig_waiting = None;
            tcb.sig_snapshot = core::ptr::null_mut();
            return Err(err);
        }

        hit = mask.intersection(snapshot);
    }

    let signal = hit.lowest_set().ok_or(Error::Again)?;
    accept_on(tcb, signal)?;
    Ok(signal)
}

/// Unblock functor of a signal wait: snapshots the pending set for the
/// waking thread and ends the wait.
fn signal_wait_unblock(tcb: &mut Tcb) {
    if !tcb.sig_snapshot.is_null() {
        unsafe { *tcb.sig_snapshot = tcb.sig_pending };
        tcb.sig_snapshot = core::ptr::null_mut();
    }
    tcb.sig_waiting = None;
}

fn accept_on(tcb: &mut Tcb, signal: u8) -> OsResult<()> {
    if !tcb.sig_pending.contains(signal) {
        return Err(Error::Inval);
    }
    tcb.sig_pending.remove(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let mut set = SigSet::empty();
        assert!(set.is_empty());

        set.add(3).unwrap();
        set.add(17).unwrap();
        assert!(set.contains(3));
        assert!(set.contains(17));
        assert!(!set.contains(4));

        assert_eq!(set.add(32), Err(Error::Inval));

        set.remove(3).unwrap();
        assert!(!set.contains(3));
        assert!(set.contains(17));
    }

    #[test]
    fn lowest_set_bit_wins() {
        let mut set = SigSet::empty();
        assert_eq!(set.lowest_set(), None);

        set.add(7).unwrap();
        set.add(3).unwrap();
        set.add(31).unwrap();
        assert_eq!(set.lowest_set(), Some(3));

        set.remove(3).unwrap();
        assert_eq!(set.lowest_set(), Some(7));
    }

    #[test]
    fn intersection_masks_pending() {
        let mut mask = SigSet::empty();
        mask.add(3).unwrap();
        mask.add(7).unwrap();

        let mut pending = SigSet::empty();
        pending.add(5).unwrap();
        assert!(mask.intersection(pending).is_empty());

        pending.add(7).unwrap();
        assert_eq!(mask.intersection(pending).lowest_set(), Some(7));
    }

    #[test]
    fn accept_round_trip() {
        let mut tcb = Tcb::new();

        tcb.sig_pending.add(9).unwrap();
        accept_on(&mut tcb, 9).unwrap();
        assert!(tcb.sig_pending.is_empty());

        // accepting a signal that is not pending is an error
        assert_eq!(accept_on(&mut tcb, 9), Err(Error::Inval));
    }
}
