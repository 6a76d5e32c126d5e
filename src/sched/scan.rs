//! Circular pool scan.

use super::RunQueue;
use crate::thread::{Tcb, ThreadState};

/// Dispatches the first Ready slot after the current one, wrapping around.
///
/// Keeps no state of its own: a slot is "queued" exactly when it is Ready.
/// Each dispatch costs O(pool size).
#[derive(Debug, Default, Clone, Copy)]
pub struct CircularScan;

impl RunQueue for CircularScan {
    fn push(&mut self, pool: &mut [Tcb], slot: usize) {
        debug_assert!(
            pool[slot].state != ThreadState::Ready,
            "slot {} enqueued twice",
            slot
        );
        pool[slot].state = ThreadState::Ready;
    }

    fn pop(&mut self, pool: &mut [Tcb], current: usize) -> Option<usize> {
        let n = pool.len();
        (1..n)
            .map(|offset| (current + offset) % n)
            .find(|&slot| pool[slot].state == ThreadState::Ready)
    }

    fn len(&self, pool: &[Tcb]) -> usize {
        pool.iter()
            .filter(|tcb| tcb.state == ThreadState::Ready)
            .count()
    }
}
