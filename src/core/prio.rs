//! Priority bitmap for O(1) most-urgent-band lookup.
//!
//! Each bit represents one priority level; a set bit means at least one
//! runnable thread at that priority. Priorities are 0..=255 with higher
//! numbers more urgent, so the lookup finds the highest set bit.

use crate::config::{CFG_PRIO_IDLE, CFG_PRIO_LEVELS};
use crate::types::OsPrio;

/// Number of words needed for the priority bitmap
const PRIO_TBL_SIZE: usize = (CFG_PRIO_LEVELS + 31) / 32;

/// Priority bitmap table
///
/// Bit `p % 32` of word `p / 32` corresponds to priority `p`.
pub struct PrioTable {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    pub fn init(&mut self) {
        for word in self.bitmap.iter_mut() {
            *word = 0;
        }
    }

    /// Mark a priority as having runnable threads
    #[inline]
    pub fn insert(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_PRIO_LEVELS);

        self.bitmap[prio as usize / 32] |= 1 << (prio % 32);
    }

    /// Mark a priority as having no runnable threads
    #[inline]
    pub fn remove(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_PRIO_LEVELS);

        self.bitmap[prio as usize / 32] &= !(1 << (prio % 32));
    }

    /// Most urgent priority with runnable threads.
    ///
    /// Returns the idle priority when the table is empty; the idle thread
    /// occupies that band from `os_init` until shutdown.
    #[inline]
    pub fn highest(&self) -> OsPrio {
        let mut word_idx = PRIO_TBL_SIZE;
        while word_idx > 0 {
            word_idx -= 1;
            let word = self.bitmap[word_idx];
            if word != 0 {
                let bit = 31 - word.leading_zeros() as usize;
                return (word_idx * 32 + bit) as OsPrio;
            }
        }

        CFG_PRIO_IDLE
    }

    /// Check if a specific priority has any runnable threads
    #[inline]
    pub fn is_set(&self, prio: OsPrio) -> bool {
        (self.bitmap[prio as usize / 32] & (1 << (prio % 32))) != 0
    }

    /// Check if the table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.highest(), CFG_PRIO_IDLE);
    }

    #[test]
    fn insert_remove() {
        let mut table = PrioTable::new();

        table.insert(5);
        assert!(table.is_set(5));
        assert!(!table.is_set(4));
        assert_eq!(table.highest(), 5);

        table.insert(3);
        assert_eq!(table.highest(), 5);

        table.insert(9);
        assert_eq!(table.highest(), 9);

        table.remove(9);
        assert_eq!(table.highest(), 5);

        table.remove(5);
        table.remove(3);
        assert!(table.is_empty());
    }

    #[test]
    fn most_urgent_wins() {
        let mut table = PrioTable::new();

        table.insert(10);
        table.insert(200);
        table.insert(64);
        table.insert(255);
        table.insert(0);

        assert_eq!(table.highest(), 255);

        table.remove(255);
        assert_eq!(table.highest(), 200);

        table.remove(200);
        assert_eq!(table.highest(), 64);
    }

    #[test]
    fn word_boundaries() {
        let mut table = PrioTable::new();

        table.insert(31);
        assert_eq!(table.highest(), 31);

        table.insert(32);
        assert_eq!(table.highest(), 32);

        table.remove(32);
        assert_eq!(table.highest(), 31);

        table.insert(63);
        table.insert(64);
        assert_eq!(table.highest(), 64);
    }
}
