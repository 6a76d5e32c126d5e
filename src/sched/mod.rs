//! Ready-queue strategies.
//!
//! The scheduler asks a [`RunQueue`] which slot to dispatch next. Two
//! interchangeable strategies exist:
//!
//! * [`RoundRobin`], the default: an intrusive FIFO threaded through the
//!   TCBs' `queue_link`, O(1) per operation.
//! * [`CircularScan`] keeps no queue at all; the next Ready slot after the
//!   current one is found by scanning the pool, O(pool size) per dispatch.
//!
//! Both give the same rotation for threads that are always ready.

pub mod rr;
pub mod scan;

pub use rr::RoundRobin;
pub use scan::CircularScan;

use crate::thread::Tcb;
use alloc::boxed::Box;

/// Ordering structure over the Ready TCBs of a pool.
pub trait RunQueue {
    /// Mark `slot` Ready and make it eligible for dispatch.
    ///
    /// `slot` must not already be Ready.
    fn push(&mut self, pool: &mut [Tcb], slot: usize);

    /// Remove the next slot to dispatch. `current` is the Running slot and is
    /// never returned.
    fn pop(&mut self, pool: &mut [Tcb], current: usize) -> Option<usize>;

    /// Number of Ready slots.
    fn len(&self, pool: &[Tcb]) -> usize;

    fn is_empty(&self, pool: &[Tcb]) -> bool {
        self.len(pool) == 0
    }
}

/// Which [`RunQueue`] a runtime uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// FIFO ready queue.
    #[default]
    Fifo,
    /// Circular scan of the pool.
    CircularScan,
}

impl Policy {
    pub fn into_queue(self) -> Box<dyn RunQueue> {
        match self {
            Policy::Fifo => Box::new(RoundRobin::new()),
            Policy::CircularScan => Box::new(CircularScan),
        }
    }
}
