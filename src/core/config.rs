//! Compile-time configuration of the kernel.
//!
//! These constants control the behavior and resource limits of the RTOS.

use crate::types::{OsPrio, OsTick};

/// Number of priority levels; priorities are 0..=255, higher is more urgent
pub const CFG_PRIO_LEVELS: usize = 256;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Core clock in Hz, used to derive the SysTick reload value
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// Default round-robin quantum, in ticks
pub const CFG_TIME_QUANTA_DEFAULT: OsTick = 10;

/// Minimum thread stack size, in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Number of slots in the tick wheel used for timed waits
pub const CFG_TICK_WHEEL_SIZE: usize = 16;

/// Enable round-robin rotation for threads with that policy
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Idle thread priority; nothing may be less urgent
pub const CFG_PRIO_IDLE: OsPrio = 0;

/// Sentinel written to the lowest stack words; the tick hook halts the
/// system when it is overwritten
pub const CFG_STACK_GUARD_FILL: u32 = 0xA5A5_A5A5;
