//! Thread control block (TCB) definition.
//!
//! The TCB is the kernel's complete record of one thread: its stack, its
//! scheduling parameters, the list it currently sits on and the
//! bookkeeping needed for priority inheritance and signal delivery.

use core::ptr::NonNull;

use crate::sched::WaitList;
use crate::sync::mutex::OsMutex;
use crate::sync::sem::OsSem;
use crate::sync::signal::SigSet;
use crate::types::{
    OsPrio, OsStkElement, OsTick, SchedPolicy, ThreadState, UnblockReason,
};

/// Thread body function type.
///
/// The thread-runner trampoline calls this and terminates the thread when
/// it returns.
pub type ThreadFn = fn(*mut ());

/// Hook executed atomically while a blocked thread is being made
/// runnable, used to transfer state from the kernel to the waking thread.
pub type UnblockFn = fn(&mut Tcb);

/// Unblocking bookkeeping shared between the block and wakeup paths.
///
/// While a thread is blocked the kernel holds the functor to run on
/// wakeup; once unblocked the same slot carries the reason, which the
/// resumed thread translates into its return value.
#[derive(Clone, Copy)]
pub enum WaitInfo {
    /// Thread is not blocked and no wakeup is pending
    None,
    /// Thread is blocked; the functor runs inside `unblock`
    Blocked(Option<UnblockFn>),
    /// Thread was made runnable for this reason
    Unblocked(UnblockReason),
}

/// Thread Control Block
#[repr(C)]
pub struct Tcb {
    // ============ Stack ============
    /// Current stack pointer, written by the context switch
    pub stk_ptr: *mut OsStkElement,
    /// Base (lowest address) of the stack buffer
    pub stk_base: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    /// Thread name
    pub name: &'static str,

    // ============ Ready list links ============
    /// Next TCB in this priority band
    pub run_next: Option<NonNull<Tcb>>,
    /// Previous TCB in this priority band
    pub run_prev: Option<NonNull<Tcb>>,

    // ============ Wait list links ============
    /// Next TCB in the wait list
    pub wait_next: Option<NonNull<Tcb>>,
    /// Previous TCB in the wait list
    pub wait_prev: Option<NonNull<Tcb>>,
    /// The wait list currently holding this thread, for O(1) removal and
    /// repositioning
    pub wait_list: Option<NonNull<WaitList>>,

    // ============ Tick wheel links ============
    /// Next TCB in the tick wheel slot
    pub tick_next: Option<NonNull<Tcb>>,
    /// Previous TCB in the tick wheel slot
    pub tick_prev: Option<NonNull<Tcb>>,
    /// Absolute tick at which a sleep or timed wait expires
    pub wake_tick: OsTick,
    /// Whether the thread is currently enrolled in the tick wheel
    pub in_tick_wheel: bool,

    // ============ Scheduling ============
    /// Base priority
    pub base_prio: OsPrio,
    /// Boosted priority imposed by owned protocol mutexes, 0 when none
    pub boosted_prio: OsPrio,
    /// Scheduling policy
    pub policy: SchedPolicy,
    /// Current state
    pub state: ThreadState,
    /// Round-robin quantum, in ticks
    pub quantum: OsTick,
    /// Ticks left in the current quantum
    pub quantum_left: OsTick,

    /// Blocking bookkeeping (functor while blocked, reason afterwards)
    pub wait: WaitInfo,

    // ============ Mutex bookkeeping ============
    /// Head of the intrusive list of owned priority-protocol mutexes
    pub owned_mutexes: Option<NonNull<OsMutex>>,
    /// Priority-inheritance mutex this thread is blocked on; the boost
    /// propagation walk follows these back-pointers
    pub blocking_mutex: Option<NonNull<OsMutex>>,

    // ============ Signals ============
    /// Pending signal set
    pub sig_pending: SigSet,
    /// Signal set being waited for, only while `WaitingForSignal`
    pub sig_waiting: Option<NonNull<SigSet>>,
    /// Destination for the pending-set snapshot taken by the signal
    /// unblock functor
    pub sig_snapshot: *mut SigSet,

    // ============ Lifecycle ============
    /// Posted by the termination hook; `join` waits on it
    pub join_sem: OsSem,
    /// Thread body function
    pub entry: Option<ThreadFn>,
    /// Argument passed to the body function
    pub entry_arg: *mut (),
}

impl Tcb {
    /// Create a new, unbound TCB
    pub const fn new() -> Self {
        Tcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            run_next: None,
            run_prev: None,

            wait_next: None,
            wait_prev: None,
            wait_list: None,

            tick_next: None,
            tick_prev: None,
            wake_tick: 0,
            in_tick_wheel: false,

            base_prio: 0,
            boosted_prio: 0,
            policy: SchedPolicy::RoundRobin,
            state: ThreadState::New,
            quantum: 0,
            quantum_left: 0,

            wait: WaitInfo::None,

            owned_mutexes: None,
            blocking_mutex: None,

            sig_pending: SigSet::empty(),
            sig_waiting: None,
            sig_snapshot: core::ptr::null_mut(),

            join_sem: OsSem::new(0, 1),
            entry: None,
            entry_arg: core::ptr::null_mut(),
        }
    }

    /// Reset to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Effective priority used for every scheduling decision
    #[inline]
    pub fn effective_prio(&self) -> OsPrio {
        if self.base_prio > self.boosted_prio {
            self.base_prio
        } else {
            self.boosted_prio
        }
    }

    /// Reason of the previous unblocking, if any
    #[inline]
    pub fn unblock_reason(&self) -> Option<UnblockReason> {
        match self.wait {
            WaitInfo::Unblocked(reason) => Some(reason),
            _ => None,
        }
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.state == ThreadState::Runnable
    }
}

impl Default for Tcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}
