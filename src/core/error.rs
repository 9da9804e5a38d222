//! Error codes of the kernel.
//!
//! Uses Rust's Result pattern; the discriminants follow the POSIX errno
//! numbering so that values can cross a C ABI unchanged.

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Error {
    /// Operation not permitted (e.g. unlocking a mutex owned by another
    /// thread, condition variable wait without holding the mutex)
    Perm = 1,

    /// Interrupted wait; reserved for the join protocol, which retries
    Intr = 4,

    /// Resource temporarily unavailable (non-blocking operation would
    /// block, recursion counter saturated)
    Again = 11,

    /// Invalid argument (signal number out of range, adding a thread that
    /// is not `New`, locking a ceiling mutex above its ceiling)
    Inval = 22,

    /// Deadlock detected (self-join, re-lock of a non-recursive mutex)
    DeadLk = 35,

    /// Value would overflow (semaphore already at its maximum)
    Overflow = 75,

    /// Deadline of a timed wait elapsed
    TimedOut = 110,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, Error>;

impl Error {
    /// POSIX errno value of this error
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}
