use core::fmt;

/// Errors reported by the runtime's fallible operations.
///
/// Invariant breaches (a terminated thread being resumed, a smashed stack
/// canary) are not represented here: they abort the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// Every spawnable slot in the pool is occupied.
    TooManyThreads,
    /// The stack for a new thread could not be mapped.
    OutOfMemory,
    /// The configured stack size is below `MIN_STACK_SIZE`.
    InvalidStackSize,
    /// The configured pool capacity is zero or above `MAX_THREADS`.
    InvalidCapacity,
    /// The quantum timer could not be installed on this target.
    PreemptionUnavailable,
    /// Another runtime in this process already owns the quantum timer.
    PreemptionInUse,
}

impl ThreadError {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadError::TooManyThreads => "Maximum number of threads reached",
            ThreadError::OutOfMemory => "Not enough memory to create a new stack",
            ThreadError::InvalidStackSize => "Stack size is below the supported minimum",
            ThreadError::InvalidCapacity => "Thread pool capacity is out of range",
            ThreadError::PreemptionUnavailable => "Quantum timer is not available",
            ThreadError::PreemptionInUse => "Quantum timer is owned by another runtime",
        }
    }
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ThreadError {}

pub type ThreadResult<T> = Result<T, ThreadError>;
