//! Global kernel state and initialization.
//!
//! Holds the ready structure, the tick wheel, the kernel-wide lists and
//! the CPU state shared with the context-switch port.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::{
    CFG_PRIO_IDLE, CFG_PRIO_LEVELS, CFG_TICK_RATE_HZ, CFG_TICK_WHEEL_SIZE,
};
use crate::core::cs_cell::CsCell;
use crate::critical::{critical_section, CriticalSection};
use crate::error::{Error, OsResult};
use crate::prio::PrioTable;
use crate::sched::{ReadyList, WaitList};
use crate::thread::Tcb;
use crate::types::{OsNestingCtr, OsPrio, OsTick, SchedPolicy, ThreadState};

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
    }

    /// Check if multitasking has started
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if the kernel is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> OsNestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Enter ISR
    #[inline(always)]
    pub(crate) fn int_enter(&self) {
        if self.is_running() {
            let _ = self
                .int_nesting
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    n.checked_add(1)
                });
        }
    }

    /// Decrement interrupt nesting, returning the new level
    #[inline(always)]
    pub(crate) fn int_nesting_dec(&self) -> OsNestingCtr {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting > 0 {
            self.int_nesting.store(nesting - 1, Ordering::Relaxed);
        }
        nesting.saturating_sub(1)
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

/// Global kernel flags instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Scheduler state, guarded by the interrupt mask
pub struct SchedState {
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [ReadyList; CFG_PRIO_LEVELS],
    pub(crate) tick_wheel: [Option<NonNull<Tcb>>; CFG_TICK_WHEEL_SIZE],
    /// Monotonic tick counter, advanced by the tick handler
    pub(crate) tick: OsTick,
    pub(crate) sleep_list: WaitList,
    pub(crate) suspended_list: WaitList,
    pub(crate) terminated_list: WaitList,
    /// Hook invoked once per tick for the software timer subsystem
    pub(crate) timer_hook: Option<fn(OsTick)>,
    /// Completed context switches, bumped by the port
    pub(crate) ctx_switches: u64,
}

impl SchedState {
    const fn new() -> Self {
        const EMPTY_BAND: ReadyList = ReadyList::new();
        Self {
            prio_tbl: PrioTable::new(),
            rdy_list: [EMPTY_BAND; CFG_PRIO_LEVELS],
            tick_wheel: [None; CFG_TICK_WHEEL_SIZE],
            tick: 0,
            sleep_list: WaitList::new(ThreadState::Sleeping),
            suspended_list: WaitList::new(ThreadState::Suspended),
            terminated_list: WaitList::new(ThreadState::Terminated),
            timer_hook: None,
            ctx_switches: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline(always)]
    fn wheel_slot(tick: OsTick) -> usize {
        (tick as usize) % CFG_TICK_WHEEL_SIZE
    }

    /// Enroll a thread whose timed wait expires at `tcb.wake_tick`.
    ///
    /// # Safety
    /// `tcb` must be valid and not already enrolled.
    pub(crate) unsafe fn tick_wheel_insert(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let slot = Self::wheel_slot(tcb_ref.wake_tick);

        tcb_ref.tick_next = self.tick_wheel[slot];
        tcb_ref.tick_prev = None;
        tcb_ref.in_tick_wheel = true;

        if let Some(mut old_head) = self.tick_wheel[slot] {
            unsafe { old_head.as_mut().tick_prev = Some(tcb) };
        }

        self.tick_wheel[slot] = Some(tcb);
    }

    /// Remove a thread from the tick wheel.
    ///
    /// # Safety
    /// `tcb` must be valid and enrolled.
    pub(crate) unsafe fn tick_wheel_remove(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let slot = Self::wheel_slot(tcb_ref.wake_tick);

        if let Some(mut prev) = tcb_ref.tick_prev {
            unsafe { prev.as_mut().tick_next = tcb_ref.tick_next };
        } else {
            self.tick_wheel[slot] = tcb_ref.tick_next;
        }

        if let Some(mut next) = tcb_ref.tick_next {
            unsafe { next.as_mut().tick_prev = tcb_ref.tick_prev };
        }

        tcb_ref.tick_next = None;
        tcb_ref.tick_prev = None;
        tcb_ref.in_tick_wheel = false;
    }

    /// Head of a tick wheel slot
    #[inline(always)]
    pub(crate) fn tick_wheel_head(&self, slot: usize) -> Option<NonNull<Tcb>> {
        self.tick_wheel[slot]
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// Idle thread TCB
static mut IDLE_TCB: Tcb = Tcb::new();

/// Idle thread stack
static mut IDLE_STK: [crate::types::OsStkElement; 128] = [0; 128];

// ============ CPU/Context Switch State ============

/// CPU context switch state, shared with the port's PendSV handler
#[repr(C)]
pub struct CpuState {
    /// Current running thread's TCB pointer
    pub tcb_cur: *mut Tcb,
    /// TCB to switch to when the pending context switch runs
    pub tcb_high_rdy: *mut Tcb,
    /// Effective priority of the running thread at switch time
    pub prio_cur: OsPrio,
    /// Effective priority of the thread to switch to
    pub prio_high_rdy: OsPrio,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_high_rdy: core::ptr::null_mut(),
            prio_cur: 0,
            prio_high_rdy: 0,
        }
    }

    pub fn reset(&mut self) {
        self.tcb_cur = core::ptr::null_mut();
        self.tcb_high_rdy = core::ptr::null_mut();
        self.prio_cur = 0;
        self.prio_high_rdy = 0;
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

// ============ Initialization ============

/// Idle thread body, runs when no other thread is runnable
fn idle_thread(_: *mut ()) {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();

        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

/// Reset global kernel state
unsafe fn reset_globals() {
    KERNEL.reset();

    unsafe {
        CPU_STATE.reset();
        SCHED.get_unchecked().reset();
    }
}

// ============ Public API ============

/// Initialize the kernel.
///
/// Must be called before any other kernel function. Resets the ready
/// structure and creates the idle thread.
///
/// # Returns
/// * `Ok(())` - initialization successful
/// * `Err(Error::Perm)` - multitasking already started
#[allow(static_mut_refs)]
pub fn os_init() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(Error::Perm);
    }

    unsafe {
        reset_globals();
    }

    critical_section(|_cs| {
        unsafe {
            crate::thread::create_raw(
                &raw mut IDLE_TCB,
                "idle",
                idle_thread,
                core::ptr::null_mut(),
                CFG_PRIO_IDLE,
                SchedPolicy::Fifo,
                IDLE_STK.as_mut_ptr(),
                IDLE_STK.len(),
            )?;
            crate::sched::add(NonNull::new_unchecked(&raw mut IDLE_TCB))?;
        }

        KERNEL.set_initialized(true);
        Ok(())
    })?;

    crate::info!("kernel initialized");
    Ok(())
}

/// Start multitasking.
///
/// Switches to the most urgent runnable thread; does not return under
/// normal operation.
///
/// # Returns
/// * `Err(Error::Perm)` - not initialized, or already running
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() || KERNEL.is_running() {
        return Err(Error::Perm);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);
        let high_prio = sched.prio_tbl.highest();

        unsafe {
            match sched.rdy_list[high_prio as usize].head() {
                Some(head) => {
                    CPU_STATE.tcb_high_rdy = head.as_ptr();
                    CPU_STATE.tcb_cur = head.as_ptr();
                    CPU_STATE.prio_high_rdy = high_prio;
                    CPU_STATE.prio_cur = high_prio;
                }
                None => return Err(Error::Inval),
            }
        }

        KERNEL.set_running(true);
        Ok(())
    })?;

    crate::port::os_cpu_systick_init(crate::config::CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ);

    crate::info!("starting multitasking");

    unsafe { crate::port::os_start_high_rdy() };

    Ok(())
}

/// Enter ISR; pairs with [`os_int_exit`]
pub fn os_int_enter() {
    KERNEL.int_enter();
}

/// Exit ISR, performing a pending context switch when the nesting drops
/// to zero and a more urgent thread became runnable.
pub fn os_int_exit() {
    if !KERNEL.is_running() {
        return;
    }

    let _cs = CriticalSection::enter();

    if KERNEL.int_nesting() == 0 {
        return;
    }

    if KERNEL.int_nesting_dec() == 0 {
        unsafe {
            let sched = SCHED.get_unchecked();
            let high_prio = sched.prio_tbl.highest();

            if let Some(head) = sched.rdy_list[high_prio as usize].head() {
                if Some(head) != tcb_cur_ptr() {
                    CPU_STATE.tcb_high_rdy = head.as_ptr();
                    CPU_STATE.prio_high_rdy = high_prio;
                    crate::port::os_int_ctx_sw();
                }
            }
        }
    }
}

// ============ Internal accessors for other modules ============

/// Get mutable reference to the priority table
///
/// # Safety
/// Interrupts must be masked.
#[inline(always)]
pub(crate) unsafe fn prio_table() -> &'static mut PrioTable {
    unsafe { &mut SCHED.get_unchecked().prio_tbl }
}

/// Get the ready band for a priority
///
/// # Safety
/// Interrupts must be masked.
#[inline(always)]
pub(crate) unsafe fn rdy_list(prio: OsPrio) -> &'static mut ReadyList {
    unsafe { &mut SCHED.get_unchecked().rdy_list[prio as usize] }
}

/// Current TCB pointer
#[inline]
#[allow(static_mut_refs)]
pub(crate) fn tcb_cur_ptr() -> Option<NonNull<Tcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_cur) }
}

/// Publish the thread the next context switch will resume
///
/// # Safety
/// Interrupts must be masked.
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_high_rdy(tcb: NonNull<Tcb>, prio: OsPrio) {
    unsafe {
        CPU_STATE.tcb_high_rdy = tcb.as_ptr();
        CPU_STATE.prio_high_rdy = prio;
    }
}

/// Tick value without taking the interrupt mask
///
/// # Safety
/// Interrupts must be masked.
#[inline(always)]
pub(crate) unsafe fn tick_unlocked() -> OsTick {
    unsafe { SCHED.get_unchecked().tick }
}
