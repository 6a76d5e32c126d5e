//! FIFO round-robin ready queue.

use super::RunQueue;
use crate::thread::{Tcb, ThreadState};

/// Intrusive singly linked FIFO over pool slots.
///
/// The links live in each TCB's `queue_link`; the queue itself only records
/// the ends, so push and pop are O(1) and never allocate.
#[derive(Debug, Default)]
pub struct RoundRobin {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl RoundRobin {
    pub const fn new() -> Self {
        RoundRobin {
            head: None,
            tail: None,
            len: 0,
        }
    }
}

impl RunQueue for RoundRobin {
    fn push(&mut self, pool: &mut [Tcb], slot: usize) {
        debug_assert!(
            pool[slot].state != ThreadState::Ready,
            "slot {} enqueued twice",
            slot
        );

        pool[slot].state = ThreadState::Ready;
        pool[slot].queue_link = None;

        match self.tail {
            Some(tail) => pool[tail].queue_link = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
    }

    fn pop(&mut self, pool: &mut [Tcb], _current: usize) -> Option<usize> {
        let slot = self.head?;

        self.head = pool[slot].queue_link.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(slot)
    }

    fn len(&self, _pool: &[Tcb]) -> usize {
        self.len
    }
}
