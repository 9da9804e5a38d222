//! Preemptive RTOS core for small 32-bit microcontrollers
//!
//! A real-time kernel providing:
//! - Priority-driven preemptive scheduling with round-robin bands
//! - Synchronization primitives (semaphores, mutexes with priority
//!   inheritance and ceiling, condition variables)
//! - Per-thread asynchronous signals
//! - Tick-based timed waits and sleeps
//! - Context switching for ARM Cortex-M

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod port;
pub mod sync;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{Error, OsResult};
pub use crate::core::kernel;
pub use crate::core::kernel::{os_init, os_start};
pub use crate::core::prio;
pub use crate::core::sched;
pub use crate::core::sched::yield_now;
pub use crate::core::stats;
pub use crate::core::thread;
pub use crate::core::thread::Tcb;
pub use crate::core::time;
pub use crate::core::time::{now, sleep_for, sleep_until};
pub use crate::core::types;
pub use crate::core::types::*;

pub use crate::sync::condvar;
pub use crate::sync::condvar::CondVar;
pub use crate::sync::mutex;
pub use crate::sync::mutex::{Mutex, Protocol};
pub use crate::sync::sem;
pub use crate::sync::sem::Semaphore;
pub use crate::sync::signal;
pub use crate::sync::signal::SigSet;
