use crate::arch::Context;
use crate::runtime::Runtime;
use crate::stack::Stack;
use crate::time::Instant;
use alloc::boxed::Box;
use core::fmt;
use core::time::Duration;

/// Identifier of a user-level thread.
///
/// Ids are handed out in increasing order and never reused; id 0 always names
/// the bootstrap thread that built the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    /// The bootstrap ("main") thread.
    pub const MAIN: ThreadId = ThreadId(0);

    pub(crate) const fn new(raw: usize) -> Self {
        ThreadId(raw)
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn is_main(self) -> bool {
        self == ThreadId::MAIN
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Slot unused; eligible for the next `create`.
    Free,
    /// Waiting for dispatch.
    Ready,
    /// Currently executing. Exactly one TCB is in this state.
    Running,
}

/// Body of a spawned thread.
///
/// Stored as `FnMut` so the allocation can stay in the TCB while the body runs
/// and be released later under the switch gate; it is only ever called once.
pub type Entry = Box<EntryBody>;

pub type EntryBody = dyn FnMut(&Runtime) + 'static;

/// Wall-clock accounting for one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadStats {
    /// Total time spent Running across all completed bursts.
    pub execution_time: Duration,
    /// Length of the most recently completed burst.
    pub last_burst: Duration,
    /// Number of times the thread was dispatched.
    pub dispatches: u64,
}

/// Snapshot of an occupied pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub slot: usize,
    pub state: ThreadState,
    pub stats: ThreadStats,
}

/// Thread control block: one reusable pool slot.
pub struct Tcb {
    pub id: ThreadId,
    pub state: ThreadState,
    pub context: Context,
    /// Kept after the slot is freed so the next occupant can reuse it.
    pub stack: Option<Stack>,
    /// Called in place on first dispatch and dropped when the thread terminates.
    pub entry: Option<Entry>,
    /// Next slot in the ready queue, if this TCB is enqueued.
    pub queue_link: Option<usize>,
    pub burst_start: Instant,
    pub stats: ThreadStats,
}

impl Tcb {
    pub(crate) fn vacant() -> Self {
        Tcb {
            id: ThreadId::MAIN,
            state: ThreadState::Free,
            context: Context::default(),
            stack: None,
            entry: None,
            queue_link: None,
            burst_start: Instant::default(),
            stats: ThreadStats::default(),
        }
    }

    /// Reset the administrative fields for a new occupant. The state is left
    /// to the caller.
    pub(crate) fn claim(&mut self, id: ThreadId) {
        self.id = id;
        self.queue_link = None;
        self.burst_start = Instant::default();
        self.stats = ThreadStats::default();
    }

    pub fn is_free(&self) -> bool {
        self.state == ThreadState::Free
    }

    pub fn is_runnable(&self) -> bool {
        self.state == ThreadState::Ready || self.state == ThreadState::Running
    }

    /// Close the burst that started at `burst_start`.
    pub(crate) fn summarize_burst(&mut self, now: Instant) {
        let burst = now.duration_since(self.burst_start);
        self.stats.execution_time += burst;
        self.stats.last_burst = burst;
    }

    pub(crate) fn begin_burst(&mut self, now: Instant) {
        self.burst_start = now;
        self.stats.dispatches += 1;
    }

    /// Whether the thread has overrun its stack.
    pub fn check_stack_overflow(&self) -> bool {
        self.stack.as_ref().is_some_and(|stack| !stack.canary_intact())
    }

    pub(crate) fn info(&self, slot: usize) -> ThreadInfo {
        ThreadInfo {
            id: self.id,
            slot,
            state: self.state,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_is_runnable() {
        let mut tcb = Tcb::vacant();
        assert!(tcb.is_free());
        assert!(!tcb.is_runnable());

        tcb.claim(ThreadId::new(4));
        tcb.state = ThreadState::Ready;
        assert!(tcb.is_runnable());
        assert_eq!(tcb.id.get(), 4);

        tcb.state = ThreadState::Running;
        assert!(tcb.is_runnable());
    }

    #[test]
    fn test_burst_accounting() {
        let mut tcb = Tcb::vacant();
        tcb.claim(ThreadId::new(1));
        tcb.state = ThreadState::Running;

        let start = Instant::now();
        tcb.begin_burst(start);
        tcb.summarize_burst(start);
        assert_eq!(tcb.stats.last_burst, Duration::ZERO);
        assert_eq!(tcb.stats.dispatches, 1);

        tcb.begin_burst(Instant::now());
        tcb.summarize_burst(Instant::now());
        assert!(tcb.stats.execution_time >= tcb.stats.last_burst);
        assert_eq!(tcb.stats.dispatches, 2);
    }

    #[test]
    fn test_main_id() {
        assert!(ThreadId::MAIN.is_main());
        assert!(!ThreadId::new(1).is_main());
        assert!(ThreadId::new(1) > ThreadId::MAIN);
    }
}
