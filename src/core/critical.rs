//! Critical sections.
//!
//! Every kernel mutation happens inside a scoped interrupt-mask region.
//! The guard saves the prior mask state on entry and restores it on exit,
//! so regions nest freely.

/// RAII guard for critical sections.
///
/// Creating the guard masks interrupts; dropping it restores the mask
/// state captured at entry.
pub struct CriticalSection {
    #[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
    was_active: bool,
}

impl CriticalSection {
    /// Enter a critical section, saving the prior interrupt mask state.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        {
            let was_active = cortex_m::register::primask::read().is_active();
            cortex_m::interrupt::disable();
            CriticalSection { was_active }
        }

        #[cfg(not(target_arch = "arm"))]
        CriticalSection { was_active: false }
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        #[cfg(target_arch = "arm")]
        if self.was_active {
            // SAFETY: interrupts were enabled when this guard was created
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}

/// Execute a closure with interrupts masked.
///
/// The closure receives a reference to the guard, which can be used to
/// access [`CsCell`](crate::core::cs_cell::CsCell) protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}
