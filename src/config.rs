//! Startup configuration for a [`Runtime`](crate::Runtime).

use crate::error::{ThreadError, ThreadResult};
use crate::sched::Policy;
use core::time::Duration;

/// Smallest stack a thread may be created with.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Largest pool a runtime may be built with.
pub const MAX_THREADS: usize = 1 << 16;

/// Runtime configuration, fixed once the runtime is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of threads that may exist besides the bootstrap thread.
    pub max_threads: usize,
    /// Stack size in bytes for every spawned thread.
    pub stack_size: usize,
    /// Round-robin quantum. `Duration::ZERO` means cooperative scheduling only.
    pub quantum: Duration,
    /// Whether `create` yields right away so the new thread may run first.
    pub schedule_immediately: bool,
    /// Whether lifecycle events are written to stderr.
    pub verbose: bool,
    /// Ready-queue strategy.
    pub policy: Policy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_threads: 50,
            stack_size: 0x40_0000,
            quantum: Duration::ZERO,
            schedule_immediately: false,
            verbose: false,
            policy: Policy::Fifo,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn quantum(mut self, quantum: Duration) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn schedule_immediately(mut self, enabled: bool) -> Self {
        self.schedule_immediately = enabled;
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether timer preemption is requested.
    pub fn preemptive(&self) -> bool {
        !self.quantum.is_zero()
    }

    /// Reject configurations the runtime cannot honour.
    pub fn validate(&self) -> ThreadResult<()> {
        if self.max_threads == 0 || self.max_threads > MAX_THREADS {
            return Err(ThreadError::InvalidCapacity);
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ThreadError::InvalidStackSize);
        }
        Ok(())
    }
}
