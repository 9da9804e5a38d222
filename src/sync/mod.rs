//! Synchronization primitives.
//!
//! Contains semaphores, mutexes, condition variables and signals.

pub mod condvar;
pub mod mutex;
pub mod sem;
pub mod signal;
