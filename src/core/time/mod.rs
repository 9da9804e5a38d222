//! Time management module.
//!
//! Owns the tick clock, the sleep operations and the tick handler that
//! expires timed waits, drives round-robin accounting and dispatches the
//! software-timer hook.

use crate::critical::critical_section;
use crate::error::{Error, OsResult};
use crate::kernel;
use crate::kernel::{KERNEL, SCHED};
use crate::sched;
use crate::types::{OsTick, UnblockReason};

/// Current value of the monotonic tick clock
#[inline]
pub fn now() -> OsTick {
    critical_section(|cs| SCHED.get(cs).tick)
}

/// Sleep until the tick clock reaches `deadline`.
///
/// Returns immediately when the deadline already passed.
pub fn sleep_until(deadline: OsTick) -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(Error::Perm);
    }

    if crate::critical::is_isr_context() {
        return Err(Error::Perm);
    }

    critical_section(|_cs| unsafe {
        let sched_state = SCHED.get_unchecked();

        if deadline <= sched_state.tick {
            return Ok(());
        }

        match sched::block_until(&mut sched_state.sleep_list, deadline, None) {
            // the deadline itself is the wakeup here
            Err(Error::TimedOut) => Ok(()),
            result => result,
        }
    })
}

/// Sleep for at least `duration` ticks.
///
/// The extra tick rounds up, so the full duration elapses despite tick
/// granularity.
pub fn sleep_for(duration: OsTick) -> OsResult<()> {
    sleep_until(now() + duration + 1)
}

/// Register the hook the tick handler invokes once per tick with the new
/// tick value.
///
/// This is the consumption point for the software timer subsystem: the
/// hook runs in ISR context with interrupts masked and must not block;
/// posting, notifying and generating signals are all allowed.
pub fn set_timer_hook(hook: fn(OsTick)) {
    critical_section(|cs| {
        SCHED.get(cs).timer_hook = Some(hook);
    });
}

/// System tick handler.
///
/// Advances the clock, wakes expired sleepers and timed waiters, performs
/// round-robin accounting, runs the software-timer hook and checks the
/// running thread's stack guard.
pub fn tick_handler() {
    if !KERNEL.is_running() {
        return;
    }

    kernel::os_int_enter();

    critical_section(|_cs| {
        let tick = unsafe {
            let sched_state = SCHED.get_unchecked();
            sched_state.tick += 1;
            sched_state.tick
        };

        expire_timed_waits(tick);
        sched::round_robin_tick();

        let hook = unsafe { SCHED.get_unchecked().timer_hook };
        if let Some(hook) = hook {
            hook(tick);
        }

        stack_guard_check();
    });

    kernel::os_int_exit();
}

/// Wake every thread in the current tick-wheel slot whose deadline has
/// been reached.
fn expire_timed_waits(tick: OsTick) {
    let slot = (tick as usize) % crate::config::CFG_TICK_WHEEL_SIZE;

    unsafe {
        let mut cursor = SCHED.get_unchecked().tick_wheel_head(slot);

        while let Some(tcb) = cursor {
            cursor = tcb.as_ref().tick_next;

            if tcb.as_ref().wake_tick <= tick {
                SCHED.get_unchecked().tick_wheel_remove(tcb);
                sched::unblock(tcb, UnblockReason::Timeout);
            }
        }
    }
}

/// Halt through the port hook when the running thread has overwritten its
/// stack guard words.
fn stack_guard_check() {
    if let Some(cur) = kernel::tcb_cur_ptr() {
        unsafe {
            let t = cur.as_ref();
            if !t.stk_base.is_null()
                && (*t.stk_base != crate::config::CFG_STACK_GUARD_FILL
                    || *t.stk_base.add(1) != crate::config::CFG_STACK_GUARD_FILL)
            {
                crate::port::halt();
            }
        }
    }
}

/// SysTick interrupt handler
#[cfg(target_arch = "arm")]
#[no_mangle]
pub extern "C" fn SysTick() {
    tick_handler();
}
