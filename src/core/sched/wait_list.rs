//! Wait list - blocked threads of one primitive, ordered by urgency.
//!
//! Every blocking primitive (semaphore, mutex, condition variable, signal
//! wait, sleep, suspension) owns one of these. Threads are kept in
//! descending effective-priority order with FIFO ordering inside each
//! priority band, so the head is always the next thread to wake. The list
//! carries the [`ThreadState`] tag it stamps on enqueued threads, and
//! each enqueued TCB records a back-pointer here for O(1) removal and
//! repositioning from anywhere.

use core::ptr::NonNull;

use crate::thread::Tcb;
use crate::types::ThreadState;

/// List of threads blocked on a single primitive
pub struct WaitList {
    head: Option<NonNull<Tcb>>,
    tail: Option<NonNull<Tcb>>,
    state: ThreadState,
}

impl WaitList {
    /// Create a new empty list stamping `state` on blocked threads
    pub const fn new(state: ThreadState) -> Self {
        WaitList {
            head: None,
            tail: None,
            state,
        }
    }

    /// State stamped on threads held by this list
    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Most urgent waiter (next to wake)
    #[inline]
    pub fn head(&self) -> Option<NonNull<Tcb>> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Enqueue a thread in priority order.
    ///
    /// `ahead_of_equals` selects the position inside the band of equal
    /// effective priority: `false` joins at the back (FIFO arrival),
    /// `true` goes in front, which is how a lowered thread keeps its
    /// place among peers it never left.
    ///
    /// # Safety
    /// `tcb` must be valid and not on any list.
    pub unsafe fn insert(&mut self, tcb: NonNull<Tcb>, ahead_of_equals: bool) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let prio = tcb_ref.effective_prio();

        let mut next = self.head;
        let mut prev: Option<NonNull<Tcb>> = None;

        while let Some(cur) = next {
            let cur_prio = unsafe { cur.as_ref().effective_prio() };
            if cur_prio < prio || (ahead_of_equals && cur_prio == prio) {
                break;
            }
            prev = next;
            next = unsafe { cur.as_ref().wait_next };
        }

        tcb_ref.wait_prev = prev;
        tcb_ref.wait_next = next;

        match prev {
            Some(p) => unsafe { (*p.as_ptr()).wait_next = Some(tcb) },
            None => self.head = Some(tcb),
        }

        match next {
            Some(n) => unsafe { (*n.as_ptr()).wait_prev = Some(tcb) },
            None => self.tail = Some(tcb),
        }

        tcb_ref.wait_list = Some(NonNull::from(&mut *self));
        tcb_ref.state = self.state;
    }

    /// Unlink a thread.
    ///
    /// # Safety
    /// `tcb` must be valid and on this list.
    pub unsafe fn remove(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.wait_prev {
            Some(prev) => unsafe { (*prev.as_ptr()).wait_next = tcb_ref.wait_next },
            None => self.head = tcb_ref.wait_next,
        }

        match tcb_ref.wait_next {
            Some(next) => unsafe { (*next.as_ptr()).wait_prev = tcb_ref.wait_prev },
            None => self.tail = tcb_ref.wait_prev,
        }

        tcb_ref.wait_prev = None;
        tcb_ref.wait_next = None;
        tcb_ref.wait_list = None;
    }

    /// Re-sort one thread after its effective priority changed.
    ///
    /// # Safety
    /// `tcb` must be valid and on this list.
    pub unsafe fn reposition(&mut self, tcb: NonNull<Tcb>, ahead_of_equals: bool) {
        unsafe {
            self.remove(tcb);
            self.insert(tcb, ahead_of_equals);
        }
    }
}

unsafe impl Send for WaitList {}
unsafe impl Sync for WaitList {}
