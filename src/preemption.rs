//! Round-robin quantum timer.
//!
//! A one-shot `ITIMER_REAL` raises `SIGALRM` when the quantum expires. The
//! handler rearms the timer and asks the armed runtime to switch threads. Only
//! one runtime per process can own the timer at a time.

use crate::error::{ThreadError, ThreadResult};
use crate::runtime::Runtime;
use core::ptr;
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

static ARMED: AtomicPtr<Runtime> = AtomicPtr::new(ptr::null_mut());
/// `pthread_t` of the OS thread the armed runtime lives on.
static OWNER: AtomicUsize = AtomicUsize::new(0);
static QUANTUM_US: AtomicU64 = AtomicU64::new(0);

pub struct Preemption {
    armed: AtomicBool,
}

impl Default for Preemption {
    fn default() -> Self {
        Self::new()
    }
}

impl Preemption {
    pub const fn new() -> Self {
        Preemption {
            armed: AtomicBool::new(false),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Route quantum expiries to `runtime` every `quantum`.
    ///
    /// # Safety
    /// `runtime` must stay at the same address until [`Preemption::disarm`] is
    /// called, and this must be called on the OS thread that drives it.
    pub unsafe fn arm(&self, runtime: *const Runtime, quantum: Duration) -> ThreadResult<()> {
        if ARMED
            .compare_exchange(
                ptr::null_mut(),
                runtime as *mut Runtime,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(ThreadError::PreemptionInUse);
        }

        OWNER.store(libc::pthread_self() as usize, Ordering::SeqCst);
        QUANTUM_US.store(quantum_micros(quantum), Ordering::SeqCst);

        if let Err(err) = install_handler().and_then(|()| set_timer(quantum_micros(quantum))) {
            ARMED.store(ptr::null_mut(), Ordering::SeqCst);
            return Err(err);
        }
        self.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the timer and release ownership. Idempotent.
    ///
    /// The handler stays installed; with nothing armed it ignores the signal.
    pub fn disarm(&self) {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        set_timer(0).ok();
        ARMED.store(ptr::null_mut(), Ordering::SeqCst);
    }
}

/// Sub-microsecond quanta round up; a zero timer value would disarm.
fn quantum_micros(quantum: Duration) -> u64 {
    quantum.as_micros().clamp(1, u64::MAX as u128) as u64
}

fn install_handler() -> ThreadResult<()> {
    unsafe {
        let mut action: libc::sigaction = core::mem::zeroed();
        action.sa_sigaction = on_quantum as usize;
        // SA_NODEFER: the handler may switch away and not return for a long
        // time, and SIGALRM must stay deliverable meanwhile.
        action.sa_flags = libc::SA_NODEFER | libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGALRM, &action, ptr::null_mut()) == -1 {
            return Err(ThreadError::PreemptionUnavailable);
        }

        let mut set: libc::sigset_t = core::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGALRM);
        if libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, ptr::null_mut()) != 0 {
            return Err(ThreadError::PreemptionUnavailable);
        }
    }
    Ok(())
}

/// One-shot timer; `micros == 0` cancels it.
fn set_timer(micros: u64) -> ThreadResult<()> {
    let value = libc::timeval {
        tv_sec: (micros / 1_000_000) as libc::time_t,
        tv_usec: (micros % 1_000_000) as libc::suseconds_t,
    };
    let timer = libc::itimerval {
        it_interval: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        it_value: value,
    };
    if unsafe { libc::setitimer(libc::ITIMER_REAL, &timer, ptr::null_mut()) } == -1 {
        return Err(ThreadError::PreemptionUnavailable);
    }
    Ok(())
}

extern "C" fn on_quantum(_signal: libc::c_int) {
    let runtime = ARMED.load(Ordering::SeqCst);
    if runtime.is_null() {
        return;
    }

    unsafe {
        let errno = libc::__errno_location();
        let saved_errno = *errno;

        let owner = OWNER.load(Ordering::SeqCst) as libc::pthread_t;
        if libc::pthread_self() != owner {
            // Process-directed signal picked another OS thread.
            libc::pthread_kill(owner, libc::SIGALRM);
        } else {
            set_timer(QUANTUM_US.load(Ordering::SeqCst)).ok();
            (*runtime).preempt();
        }

        *errno = saved_errno;
    }
}
