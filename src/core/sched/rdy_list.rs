//! Ready list - doubly linked list of TCBs forming one priority band.
//!
//! Each priority level has its own band. Threads becoming runnable join
//! at the tail, the scheduler runs the head, and round-robin rotates the
//! head back to the tail.

use core::ptr::NonNull;

use crate::thread::Tcb;

/// Ready list for a single priority band
pub struct ReadyList {
    head: Option<NonNull<Tcb>>,
    tail: Option<NonNull<Tcb>>,
}

impl ReadyList {
    /// Create a new empty band
    pub const fn new() -> Self {
        ReadyList {
            head: None,
            tail: None,
        }
    }

    /// Reset the band
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    /// First thread of the band (next to run)
    #[inline]
    pub fn head(&self) -> Option<NonNull<Tcb>> {
        self.head
    }

    /// Last thread of the band
    #[inline]
    pub fn tail(&self) -> Option<NonNull<Tcb>> {
        self.tail
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Whether the band holds two or more threads
    #[inline]
    pub fn has_contenders(&self) -> bool {
        self.head.is_some() && self.head != self.tail
    }

    /// Append a TCB at the tail (FIFO arrival order).
    ///
    /// # Safety
    /// `tcb` must be valid and not on any list.
    pub unsafe fn push_tail(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.run_next = None;
        tcb_ref.run_prev = self.tail;

        match self.tail {
            Some(tail) => unsafe { (*tail.as_ptr()).run_next = Some(tcb) },
            None => self.head = Some(tcb),
        }

        self.tail = Some(tcb);
    }

    /// Prepend a TCB at the head.
    ///
    /// Used when a lowered thread keeps its place in front of the band it
    /// is demoted into.
    ///
    /// # Safety
    /// `tcb` must be valid and not on any list.
    pub unsafe fn push_head(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.run_prev = None;
        tcb_ref.run_next = self.head;

        match self.head {
            Some(head) => unsafe { (*head.as_ptr()).run_prev = Some(tcb) },
            None => self.tail = Some(tcb),
        }

        self.head = Some(tcb);
    }

    /// Unlink a TCB from the band.
    ///
    /// # Safety
    /// `tcb` must be valid and on this list.
    pub unsafe fn remove(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.run_prev {
            Some(prev) => unsafe { (*prev.as_ptr()).run_next = tcb_ref.run_next },
            None => self.head = tcb_ref.run_next,
        }

        match tcb_ref.run_next {
            Some(next) => unsafe { (*next.as_ptr()).run_prev = tcb_ref.run_prev },
            None => self.tail = tcb_ref.run_prev,
        }

        tcb_ref.run_prev = None;
        tcb_ref.run_next = None;
    }

    /// Move the head to the tail (round-robin rotation, yield).
    ///
    /// # Safety
    /// All TCBs on the list must be valid.
    pub unsafe fn rotate(&mut self) {
        if let Some(head) = self.head {
            if self.head != self.tail {
                unsafe {
                    self.remove(head);
                    self.push_tail(head);
                }
            }
        }
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

// Only touched within critical sections
unsafe impl Send for ReadyList {}
unsafe impl Sync for ReadyList {}
