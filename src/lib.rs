//! User-level threads for Linux.
//!
//! A [`Runtime`] multiplexes many threads onto the OS thread that builds it.
//! Threads are scheduled round-robin: they run until they yield, terminate or,
//! when a quantum is configured, until a `SIGALRM` timer preempts them.
//!
//! ```no_run
//! use ult_runtime::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::new(RuntimeConfig::new().max_threads(4)).unwrap();
//! for _ in 0..4 {
//!     runtime
//!         .create(|rt| {
//!             for _ in 0..3 {
//!                 rt.yield_now();
//!             }
//!         })
//!         .unwrap();
//! }
//! runtime.process_return(0);
//! ```

#![no_std]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(not(target_os = "linux"))]
compile_error!("ult-runtime requires Linux");

pub mod arch;
pub mod config;
pub mod error;
pub mod log;
pub mod preemption;
pub mod runtime;
pub mod sched;
pub mod scheduler;
pub mod signal_safe;
pub mod stack;
pub mod thread;
pub mod time;


pub use config::{RuntimeConfig, MAX_THREADS, MIN_STACK_SIZE};
pub use error::{ThreadError, ThreadResult};
pub use runtime::Runtime;
pub use sched::Policy;
pub use thread::{ThreadId, ThreadInfo, ThreadState, ThreadStats};
