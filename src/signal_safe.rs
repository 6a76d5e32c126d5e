use portable_atomic::{AtomicBool, AtomicU64, Ordering};

/// Signal-safe switch gate
///
/// Serializes access to the scheduler between ordinary runtime calls and the
/// quantum signal handler, which runs on the same OS thread:
/// - A runtime call closes the gate before touching scheduler state and
///   reopens it when done; the thread it switches to reopens on its behalf.
/// - The handler only switches if it can close the gate itself. Otherwise it
///   records a deferred preemption, which the gate holder performs as soon as
///   it reopens.
/// - Only atomic operations; nothing here allocates or blocks.
pub struct SwitchGate {
    closed: AtomicBool,
    deferred: AtomicBool,
    preemptions: AtomicU64,
    deferrals: AtomicU64,
}

impl Default for SwitchGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchGate {
    pub const fn new() -> Self {
        SwitchGate {
            closed: AtomicBool::new(false),
            deferred: AtomicBool::new(false),
            preemptions: AtomicU64::new(0),
            deferrals: AtomicU64::new(0),
        }
    }

    /// Close the gate from ordinary (non-handler) code.
    ///
    /// Ordinary code only ever runs with the gate open, so this cannot race a
    /// handler that already holds it.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Close the gate if it is open. Used by the signal handler.
    pub fn try_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Record a preemption that arrived while the gate was closed.
    pub fn defer(&self) {
        self.deferred.store(true, Ordering::SeqCst);
        self.deferrals.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume a deferred preemption, if any.
    pub fn take_deferred(&self) -> bool {
        self.deferred.swap(false, Ordering::SeqCst)
    }

    pub fn record_preemption(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Quantum expiries that led to a switch attempt.
    pub fn preemptions(&self) -> u64 {
        self.preemptions.load(Ordering::Relaxed)
    }

    /// Quantum expiries that found the gate closed.
    pub fn deferrals(&self) -> u64 {
        self.deferrals.load(Ordering::Relaxed)
    }
}
