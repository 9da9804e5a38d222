//! Core type definitions for the kernel.
//!
//! These types provide strong typing for scheduler and synchronization
//! primitives.

/// Thread priority (0 = lowest, 255 = most urgent)
pub type OsPrio = u8;

/// Tick counter type, monotonic since boot
pub type OsTick = u64;

/// Semaphore counter type
pub type OsSemCtr = u32;

/// Nesting counter (mutex recursion, interrupt nesting)
pub type OsNestingCtr = u8;

/// Stack element type
pub type OsStkElement = u32;

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Created but not yet added to the scheduler
    New = 0,
    /// Ready to run (running, when at the head of the top ready band)
    Runnable = 1,
    /// Sleeping until a wake tick
    Sleeping = 2,
    /// Blocked on a semaphore
    BlockedOnSemaphore = 3,
    /// Blocked on a mutex
    BlockedOnMutex = 4,
    /// Blocked on a condition variable
    BlockedOnConditionVariable = 5,
    /// Waiting for a signal
    WaitingForSignal = 6,
    /// Suspended
    Suspended = 7,
    /// Body function returned; thread will never run again
    Terminated = 8,
}

impl ThreadState {
    /// Check if the state is one entered through the scheduler's block path
    #[inline]
    pub fn is_blocked(self) -> bool {
        !matches!(
            self,
            ThreadState::New | ThreadState::Runnable | ThreadState::Terminated
        )
    }
}

/// Why a blocked thread was made runnable again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnblockReason {
    /// Explicit request (post, unlock hand-off, notify, signal, resume)
    UnblockRequest = 0,
    /// Deadline of a timed wait elapsed
    Timeout = 1,
}

/// Scheduling policy of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedPolicy {
    /// Quantum-based rotation among equal-priority threads
    RoundRobin = 0,
    /// Run until blocking or preempted by a more urgent thread
    Fifo = 1,
}
