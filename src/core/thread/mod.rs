//! Thread management module.
//!
//! Threads are created in state `New` with caller-supplied TCB and stack
//! storage, made runnable with [`start`], and terminate by returning from
//! their body function; the trampoline then posts the join semaphore and
//! parks the TCB for good.

mod tcb;

pub use tcb::{Tcb, ThreadFn, UnblockFn, WaitInfo};

use core::ptr::NonNull;

use crate::config::{CFG_STACK_GUARD_FILL, CFG_STK_SIZE_MIN, CFG_TIME_QUANTA_DEFAULT};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{Error, OsResult};
use crate::kernel;
use crate::kernel::SCHED;
use crate::sched;
use crate::types::{OsPrio, OsStkElement, SchedPolicy, ThreadState, UnblockReason};

/// Trampoline every thread starts in.
///
/// Runs the body function, then terminates the thread; the final loop is
/// unreachable.
pub(crate) extern "C" fn thread_runner(tcb: *mut Tcb) -> ! {
    unsafe {
        let t = &mut *tcb;
        if let Some(entry) = t.entry {
            entry(t.entry_arg);
        }
    }

    sched::remove()
}

/// Bind a TCB to a stack and body function, leaving it in state `New`.
///
/// The thread does not run until [`start`] is called.
///
/// # Example
/// ```ignore
/// static mut WORKER_TCB: Tcb = Tcb::new();
/// static mut WORKER_STK: [OsStkElement; 256] = [0; 256];
///
/// fn worker(_: *mut ()) {
///     // ...
/// }
///
/// thread::create(
///     unsafe { &mut WORKER_TCB },
///     unsafe { &mut WORKER_STK },
///     "worker",
///     worker,
///     core::ptr::null_mut(),
///     7,
///     SchedPolicy::RoundRobin,
/// )?;
/// thread::start(NonNull::from(unsafe { &mut WORKER_TCB }))?;
/// ```
pub fn create(
    tcb: &'static mut Tcb,
    stack: &'static mut [OsStkElement],
    name: &'static str,
    entry: ThreadFn,
    arg: *mut (),
    prio: OsPrio,
    policy: SchedPolicy,
) -> OsResult<()> {
    unsafe {
        create_raw(
            tcb as *mut Tcb,
            name,
            entry,
            arg,
            prio,
            policy,
            stack.as_mut_ptr(),
            stack.len(),
        )
    }
}

/// Raw thread creation used by [`create`] and the kernel's own threads.
///
/// # Safety
/// `tcb` and `stk_base..stk_base+stk_size` must be valid, exclusively
/// owned storage that outlives the thread.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn create_raw(
    tcb: *mut Tcb,
    name: &'static str,
    entry: ThreadFn,
    arg: *mut (),
    prio: OsPrio,
    policy: SchedPolicy,
    stk_base: *mut OsStkElement,
    stk_size: usize,
) -> OsResult<()> {
    if tcb.is_null() || stk_base.is_null() {
        return Err(Error::Inval);
    }

    if stk_size < CFG_STK_SIZE_MIN {
        return Err(Error::Inval);
    }

    if is_isr_context() {
        return Err(Error::Perm);
    }

    critical_section(|_cs| {
        let t = unsafe { &mut *tcb };
        t.init();

        t.name = name;
        t.base_prio = prio;
        t.policy = policy;
        t.quantum = CFG_TIME_QUANTA_DEFAULT;
        t.quantum_left = CFG_TIME_QUANTA_DEFAULT;
        t.entry = Some(entry);
        t.entry_arg = arg;

        unsafe {
            // Guard words at the bottom; the tick hook checks them
            *stk_base = CFG_STACK_GUARD_FILL;
            *stk_base.add(1) = CFG_STACK_GUARD_FILL;

            t.stk_ptr = crate::port::os_task_stk_init(thread_runner, tcb, stk_base, stk_size);
        }
        t.stk_base = stk_base;
        t.stk_size = stk_size;

        t.state = ThreadState::New;

        Ok(())
    })
}

/// Transition a `New` thread to `Runnable`.
///
/// # Returns
/// * `Err(Error::Inval)` - the thread is not in state `New`
pub fn start(tcb: NonNull<Tcb>) -> OsResult<()> {
    sched::add(tcb)
}

/// Wait until a thread terminates.
///
/// # Returns
/// * `Err(Error::DeadLk)` - joining the calling thread
pub fn join(tcb: NonNull<Tcb>) -> OsResult<()> {
    if Some(tcb) == kernel::tcb_cur_ptr() {
        return Err(Error::DeadLk);
    }

    loop {
        match unsafe { (*tcb.as_ptr()).join_sem.wait() } {
            Err(Error::Intr) => continue,
            result => return result,
        }
    }
}

/// Change the base priority of a thread.
///
/// When the effective priority drops, the thread keeps its place at the
/// head of the band it is demoted into, unless `always_behind` moves it
/// to the tail.
pub fn set_priority(tcb: NonNull<Tcb>, prio: OsPrio, always_behind: bool) {
    critical_section(|_cs| unsafe {
        let t = &mut *tcb.as_ptr();
        let old_prio = t.effective_prio();
        t.base_prio = prio;
        sched::reposition(tcb, old_prio, always_behind);
    })
}

/// Suspend a thread (`None` suspends the caller).
///
/// # Returns
/// * `Err(Error::Inval)` - the target thread is not runnable
pub fn suspend(tcb: Option<NonNull<Tcb>>) -> OsResult<()> {
    critical_section(|_cs| unsafe {
        let cur = kernel::tcb_cur_ptr();
        let target = tcb.or(cur).ok_or(Error::Perm)?;

        if Some(target) == cur {
            let suspended = &mut SCHED.get_unchecked().suspended_list;
            sched::block(suspended, None)
        } else {
            let t = &mut *target.as_ptr();
            if t.state != ThreadState::Runnable {
                return Err(Error::Inval);
            }
            sched::readyq_remove(target, t.effective_prio());
            SCHED.get_unchecked().suspended_list.insert(target, false);
            Ok(())
        }
    })
}

/// Resume a suspended thread.
///
/// # Returns
/// * `Err(Error::Inval)` - the thread is not suspended
pub fn resume(tcb: NonNull<Tcb>) -> OsResult<()> {
    critical_section(|_cs| unsafe {
        if tcb.as_ref().state != ThreadState::Suspended {
            return Err(Error::Inval);
        }
        sched::unblock(tcb, UnblockReason::UnblockRequest);
        Ok(())
    })
}
