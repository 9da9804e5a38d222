//! Kernel statistics.

use crate::critical::critical_section;
use crate::kernel::SCHED;

/// Number of context switches completed since boot
pub fn context_switch_count() -> u64 {
    critical_section(|cs| SCHED.get(cs).ctx_switches)
}
