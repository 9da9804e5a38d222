//! Scheduler module.
//!
//! Priority-driven preemptive scheduling with round-robin rotation inside
//! a priority band. The blocking path (`block` / `block_until` /
//! `unblock`) is shared by every synchronization primitive; the
//! primitives only supply the wait list and, optionally, an unblock
//! functor.

mod rdy_list;
mod wait_list;

pub use rdy_list::ReadyList;
pub use wait_list::WaitList;

use core::ptr::NonNull;

use crate::config::CFG_SCHED_ROUND_ROBIN_EN;
use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::error::{Error, OsResult};
use crate::kernel;
use crate::kernel::{KERNEL, SCHED};
use crate::thread::{Tcb, UnblockFn, WaitInfo};
use crate::types::{OsPrio, OsTick, SchedPolicy, ThreadState, UnblockReason};

/// Main scheduling point.
///
/// Determines the most urgent runnable thread and requests a context
/// switch when it differs from the running one. Within an ISR this is a
/// no-op; `os_int_exit` performs the equivalent check on final exit.
pub fn os_sched() {
    if !KERNEL.is_running() {
        return;
    }

    if is_isr_context() {
        return;
    }

    let _cs = CriticalSection::enter();

    unsafe {
        let high_prio = kernel::prio_table().highest();

        if let Some(head) = kernel::rdy_list(high_prio).head() {
            if Some(head) != kernel::tcb_cur_ptr() {
                kernel::set_high_rdy(head, high_prio);
                crate::port::os_ctx_sw();
            }
        }
    }
}

/// Round-robin quantum accounting, called once per tick from the tick
/// handler (ISR context, interrupts masked).
pub(crate) fn round_robin_tick() {
    if !CFG_SCHED_ROUND_ROBIN_EN || !KERNEL.is_running() {
        return;
    }

    let Some(cur) = kernel::tcb_cur_ptr() else {
        return;
    };

    unsafe {
        let tcb = &mut *cur.as_ptr();

        if tcb.policy != SchedPolicy::RoundRobin {
            return;
        }

        if tcb.quantum_left > 0 {
            tcb.quantum_left -= 1;
        }

        if tcb.quantum_left == 0 {
            tcb.quantum_left = tcb.quantum;

            let prio = tcb.effective_prio();
            let band = kernel::rdy_list(prio);

            if band.has_contenders() {
                band.rotate();
                if let Some(head) = band.head() {
                    kernel::set_high_rdy(head, prio);
                }
                crate::port::os_ctx_sw();
            }
        }
    }
}

/// Make a thread runnable for the first time.
///
/// # Returns
/// * `Err(Error::Inval)` - the thread is not in state `New`
pub fn add(tcb: NonNull<Tcb>) -> OsResult<()> {
    critical_section(|_cs| unsafe {
        let t = &mut *tcb.as_ptr();

        if t.state != ThreadState::New {
            return Err(Error::Inval);
        }

        t.state = ThreadState::Runnable;
        t.quantum_left = t.quantum;
        readyq_insert(tcb, false);

        if KERNEL.is_running() {
            os_sched();
        }

        Ok(())
    })
}

/// Block the current thread on `list` until explicitly unblocked.
///
/// Returns `Ok(())` when woken by an unblock request.
///
/// # Safety
/// Interrupts must be masked; must be called from thread context. The
/// mask is released for the duration of the context switch and held
/// again when this returns.
pub(crate) unsafe fn block(list: &mut WaitList, functor: Option<UnblockFn>) -> OsResult<()> {
    unsafe { block_common(list, functor, None) }
}

/// Block the current thread on `list`; the tick handler unblocks it with
/// reason `Timeout` when `deadline` is reached first.
///
/// A deadline that already passed fails immediately with `TimedOut`.
///
/// # Safety
/// Same contract as [`block`].
pub(crate) unsafe fn block_until(
    list: &mut WaitList,
    deadline: OsTick,
    functor: Option<UnblockFn>,
) -> OsResult<()> {
    unsafe { block_common(list, functor, Some(deadline)) }
}

unsafe fn block_common(
    list: &mut WaitList,
    functor: Option<UnblockFn>,
    deadline: Option<OsTick>,
) -> OsResult<()> {
    if let Some(deadline) = deadline {
        if deadline <= unsafe { kernel::tick_unlocked() } {
            return Err(Error::TimedOut);
        }
    }

    let cur = kernel::tcb_cur_ptr().ok_or(Error::Perm)?;

    unsafe {
        let tcb = &mut *cur.as_ptr();

        if let Some(deadline) = deadline {
            tcb.wake_tick = deadline;
            SCHED.get_unchecked().tick_wheel_insert(cur);
        }

        readyq_remove(cur, tcb.effective_prio());
        list.insert(cur, false);
        tcb.wait = WaitInfo::Blocked(functor);

        os_sched();
        crate::port::ctx_sw_window();

        // runs again only once unblocked
        match core::mem::replace(&mut tcb.wait, WaitInfo::None) {
            WaitInfo::Unblocked(UnblockReason::Timeout) => Err(Error::TimedOut),
            _ => Ok(()),
        }
    }
}

/// Make a blocked thread runnable again.
///
/// Removes it from its wait list and the tick wheel, runs the stored
/// unblock functor, records `reason` for the resumed thread and requests
/// a context switch when the woken thread outranks the running one.
/// Callable from ISR context.
///
/// # Safety
/// Interrupts must be masked; `tcb` must be blocked.
pub(crate) unsafe fn unblock(tcb: NonNull<Tcb>, reason: UnblockReason) {
    unsafe {
        let t = &mut *tcb.as_ptr();

        if let Some(mut list) = t.wait_list {
            list.as_mut().remove(tcb);
        }
        if t.in_tick_wheel {
            SCHED.get_unchecked().tick_wheel_remove(tcb);
        }

        let functor = match core::mem::replace(&mut t.wait, WaitInfo::Unblocked(reason)) {
            WaitInfo::Blocked(functor) => functor,
            _ => None,
        };
        if let Some(functor) = functor {
            functor(t);
        }

        t.quantum_left = t.quantum;
        t.state = ThreadState::Runnable;
        readyq_insert(tcb, false);

        os_sched();
    }
}

/// Terminate the current thread.
///
/// Called by the thread-runner trampoline after the body function
/// returns: posts the join semaphore, parks the TCB on the terminated
/// list and switches away forever.
pub(crate) fn remove() -> ! {
    {
        let _cs = CriticalSection::enter();

        unsafe {
            if let Some(cur) = kernel::tcb_cur_ptr() {
                let t = &mut *cur.as_ptr();

                let _ = t.join_sem.post();

                readyq_remove(cur, t.effective_prio());
                SCHED.get_unchecked().terminated_list.insert(cur, false);

                os_sched();
                crate::port::ctx_sw_window();
            }
        }
    }

    loop {
        core::hint::spin_loop();
    }
}

/// Voluntarily move the current thread behind its priority-band peers.
pub fn yield_now() {
    if !KERNEL.is_running() {
        return;
    }

    critical_section(|_cs| unsafe {
        if let Some(cur) = kernel::tcb_cur_ptr() {
            let prio = cur.as_ref().effective_prio();
            kernel::rdy_list(prio).rotate();
            os_sched();
        }
    })
}

/// Re-sort a thread after its effective priority changed from `old_prio`.
///
/// A raised thread joins the tail of its new band; a lowered one keeps
/// its place at the head of the new band unless `always_behind` demotes
/// it to the tail. Requests a context switch when the ready structure's
/// head changed.
///
/// # Safety
/// Interrupts must be masked; `tcb` must be valid. The new priority must
/// already be in effect on the TCB.
pub(crate) unsafe fn reposition(tcb: NonNull<Tcb>, old_prio: OsPrio, always_behind: bool) {
    unsafe {
        let t = &mut *tcb.as_ptr();
        let new_prio = t.effective_prio();

        if new_prio == old_prio {
            return;
        }

        let ahead = new_prio < old_prio && !always_behind;

        if t.state == ThreadState::Runnable {
            readyq_remove(tcb, old_prio);
            readyq_insert(tcb, ahead);
            os_sched();
        } else if let Some(mut list) = t.wait_list {
            list.as_mut().reposition(tcb, ahead);
        }
    }
}

/// Insert a runnable thread into its priority band.
///
/// # Safety
/// Interrupts must be masked; `tcb` must be valid and on no list.
pub(crate) unsafe fn readyq_insert(tcb: NonNull<Tcb>, at_head: bool) {
    let prio = unsafe { tcb.as_ref().effective_prio() };

    unsafe {
        let band = kernel::rdy_list(prio);
        if at_head {
            band.push_head(tcb);
        } else {
            band.push_tail(tcb);
        }
        kernel::prio_table().insert(prio);
    }
}

/// Remove a thread from the priority band it occupies under `prio`.
///
/// # Safety
/// Interrupts must be masked; `tcb` must be on the band for `prio`.
pub(crate) unsafe fn readyq_remove(tcb: NonNull<Tcb>, prio: OsPrio) {
    unsafe {
        let band = kernel::rdy_list(prio);
        band.remove(tcb);

        if band.is_empty() {
            kernel::prio_table().remove(prio);
        }
    }
}
