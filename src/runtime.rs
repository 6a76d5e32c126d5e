//! The runtime: thread creation, yield, termination and process return.
//!
//! All threads of a runtime share the OS thread that built it. Scheduler state
//! is only touched with the switch gate closed, and a thread always switches
//! with the gate still closed; whoever resumes (the switched-to thread, or a
//! fresh thread's start routine) reopens it.

use crate::arch::switch_context;
use crate::config::RuntimeConfig;
use crate::error::ThreadResult;
use crate::log;
use crate::preemption::Preemption;
use crate::scheduler::{Scheduler, SchedulerCell, MAIN_SLOT};
use crate::signal_safe::SwitchGate;
use crate::thread::{Entry, ThreadId, ThreadInfo, ThreadState, ThreadStats};
use crate::time::Instant;
use crate::ult_log;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomPinned;
use core::pin::Pin;

/// A pool of user-level threads multiplexed onto the calling OS thread.
///
/// The calling context becomes thread 0 ("main"). The runtime is pinned
/// because every thread's start routine and the quantum handler hold its
/// address.
pub struct Runtime {
    sched: SchedulerCell,
    gate: SwitchGate,
    preemption: Preemption,
    config: RuntimeConfig,
    _pinned: PhantomPinned,
}

impl Runtime {
    /// Build a runtime; the caller becomes the main thread.
    ///
    /// With a non-zero quantum the process-wide timer is armed as well, which
    /// fails with [`ThreadError::PreemptionInUse`](crate::ThreadError) if
    /// another runtime already owns it.
    pub fn new(config: RuntimeConfig) -> ThreadResult<Pin<Box<Runtime>>> {
        config.validate()?;
        let scheduler = Scheduler::new(&config)?;

        let runtime = Box::pin(Runtime {
            sched: SchedulerCell::new(scheduler),
            gate: SwitchGate::new(),
            preemption: Preemption::new(),
            config,
            _pinned: PhantomPinned,
        });

        let config = &runtime.config;
        ult_log!(
            config.verbose,
            "runtime started: {} threads, {} byte stacks, {:?} queue",
            config.max_threads,
            config.stack_size,
            config.policy
        );

        if config.preemptive() {
            unsafe { runtime.preemption.arm(&*runtime, config.quantum)? };
            ult_log!(config.verbose, "quantum timer armed every {:?}", config.quantum);
        }
        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `f` on the scheduler with the gate closed. `f` must not switch.
    fn with_sched<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        self.gate.close();
        let result = f(unsafe { self.sched.get() });
        self.reopen();
        result
    }

    /// Open the gate, then serve any quantum expiry that arrived while it was
    /// closed.
    fn reopen(&self) {
        self.gate.open();
        while self.gate.take_deferred() {
            if !self.gate.try_close() {
                return;
            }
            self.gate.record_preemption();
            unsafe { self.switch_locked() };
            self.gate.open();
        }
    }

    /// Hand the CPU to the next Ready thread.
    ///
    /// Returns `false` without switching if no other thread is Ready.
    ///
    /// # Safety
    /// The gate must be closed and no scheduler borrow may be live.
    unsafe fn switch_locked(&self) -> bool {
        let sched = self.sched.get();
        if sched.current_overflowed() {
            fatal(format_args!(
                "stack overflow detected in thread {}",
                sched.current_id()
            ));
        }
        match sched.plan_switch(Instant::now()) {
            Some(switch) => {
                switch_context(switch.from, switch.to);
                true
            }
            None => false,
        }
    }

    /// Create a thread running `body` and queue it.
    ///
    /// Fails with `TooManyThreads` when every slot is occupied and with
    /// `OutOfMemory` when its stack cannot be mapped; in both cases nothing
    /// changes. With `schedule_immediately` the caller yields before
    /// returning.
    pub fn create<F>(&self, body: F) -> ThreadResult<ThreadId>
    where
        F: FnOnce(&Runtime) + 'static,
    {
        let arg = self as *const Runtime as usize;
        let result = self.with_sched(|sched| {
            let mut body = Some(body);
            let entry: Entry = Box::new(move |runtime: &Runtime| {
                if let Some(body) = body.take() {
                    body(runtime)
                }
            });
            sched.spawn(entry, thread_start, arg)
        });

        match result {
            Ok(id) => {
                ult_log!(self.config.verbose, "new thread {} created", id);
                if self.config.schedule_immediately {
                    self.yield_now();
                }
                Ok(id)
            }
            Err(err) => {
                ult_log!(self.config.verbose, "cannot create a new thread: {}", err);
                Err(err)
            }
        }
    }

    /// Give up the CPU to the next Ready thread.
    ///
    /// The caller stays Ready and resumes here when its turn comes again.
    /// Returns `false`, having changed nothing, if no other thread was Ready.
    pub fn yield_now(&self) -> bool {
        self.gate.close();
        let switched = unsafe { self.switch_locked() };
        self.reopen();
        switched
    }

    /// Quantum expiry, delivered by the signal handler on the owning OS thread.
    pub(crate) fn preempt(&self) {
        if !self.gate.try_close() {
            self.gate.defer();
            return;
        }
        self.gate.record_preemption();

        let current = unsafe { self.sched.get() }.current_id();
        ult_log!(
            self.config.verbose,
            "quantum expired, thread {} switching context",
            current
        );
        if unsafe { self.switch_locked() } {
            ult_log!(self.config.verbose, "restarting thread {}", current);
        }
        self.reopen();
    }

    pub fn current_id(&self) -> ThreadId {
        self.with_sched(|sched| sched.current_id())
    }

    pub fn is_main(&self) -> bool {
        self.current_id().is_main()
    }

    /// Terminate the calling thread.
    ///
    /// On the main thread this is `process_return(0)`. Values owned by the
    /// caller's stack frames are not dropped.
    pub fn exit_current(&self) -> ! {
        if self.is_main() {
            self.process_return(0)
        }
        self.finish_current()
    }

    /// Return from the program with `code`.
    ///
    /// From a spawned thread this only terminates that thread. From main it
    /// first yields until no other thread is Ready, then disarms the quantum
    /// timer and exits the process. Output buffered in `std` is not flushed.
    pub fn process_return(&self, code: i32) -> ! {
        if !self.is_main() {
            self.finish_current()
        }

        self.wait_all();
        self.gate.close();
        self.preemption.disarm();
        ult_log!(self.config.verbose, "main thread returning {}", code);
        unsafe { libc::exit(code) }
    }

    /// Yield until no other thread is Ready, which, seen from main, means every
    /// spawned thread has terminated. Returns at once on other threads.
    pub fn wait_all(&self) {
        if !self.is_main() {
            return;
        }
        while self.yield_now() {}
    }

    /// Stop sequence of a spawned thread: close its burst, free its slot and
    /// switch away for good.
    fn finish_current(&self) -> ! {
        self.gate.close();
        let sched = unsafe { self.sched.get() };
        let id = sched.current_id();

        if let Some(info) = sched.retire_current(Instant::now()) {
            ult_log!(
                self.config.verbose,
                "finishing thread {}: execution time {:?}, last burst {:?}",
                info.id,
                info.stats.execution_time,
                info.stats.last_burst
            );
            unsafe { self.switch_locked() };
        }
        fatal(format_args!("thread {} resumed after termination", id))
    }

    pub fn state(&self, id: ThreadId) -> Option<ThreadState> {
        self.with_sched(|sched| sched.state(id))
    }

    /// Accounting of a live thread. The caller's own current burst is not
    /// included until it is switched out.
    pub fn stats(&self, id: ThreadId) -> Option<ThreadStats> {
        self.with_sched(|sched| sched.stats(id))
    }

    /// Snapshot of every live thread, main included.
    pub fn threads(&self) -> Vec<ThreadInfo> {
        self.with_sched(|sched| sched.threads())
    }

    pub fn ready_count(&self) -> usize {
        self.with_sched(|sched| sched.ready_count())
    }

    /// Spawned threads that have not terminated.
    pub fn live_count(&self) -> usize {
        self.with_sched(|sched| sched.live_count())
    }

    pub fn capacity(&self) -> usize {
        self.with_sched(|sched| sched.capacity())
    }

    /// Quantum expiries that switched (or tried to switch) threads.
    pub fn preemptions(&self) -> u64 {
        self.gate.preemptions()
    }

    /// Quantum expiries that arrived inside the runtime and were served late.
    pub fn deferred_preemptions(&self) -> u64 {
        self.gate.deferrals()
    }

    pub fn is_preemptive(&self) -> bool {
        self.preemption.is_armed()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.gate.close();
        self.preemption.disarm();

        let sched = self.sched.get_mut();
        if sched.current_slot() != MAIN_SLOT {
            fatal(format_args!(
                "runtime dropped from thread {}",
                sched.current_id()
            ));
        }
        ult_log!(
            self.config.verbose,
            "runtime shut down, {} threads unfinished",
            sched.live_count()
        );
    }
}

/// First code run on a new thread's stack.
///
/// Arrives with the gate closed by the thread that switched here. A panic
/// escaping the body cannot unwind through this `extern "C"` frame and aborts
/// the process.
extern "C" fn thread_start(arg: usize) -> ! {
    let runtime = unsafe { &*(arg as *const Runtime) };
    let body = unsafe { runtime.sched.get() }.current_entry();
    runtime.reopen();

    if let Some(body) = body {
        unsafe { (*body)(runtime) };
    }
    runtime.finish_current()
}

/// Report a broken runtime invariant and abort.
#[cold]
fn fatal(args: fmt::Arguments<'_>) -> ! {
    log::emit(args);
    unsafe { libc::abort() }
}
