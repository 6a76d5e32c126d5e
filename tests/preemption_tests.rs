//! Timer-driven preemption.
//!
//! The quantum timer is process-wide, so the tests take turns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ult_runtime::{Runtime, RuntimeConfig, ThreadError};

static TIMER: Mutex<()> = Mutex::new(());

const TARGET: u64 = 1_000;

/// Two threads that never yield both make progress under a quantum.
#[test]
fn test_spinning_threads_are_preempted() {
    let _timer = TIMER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let counters = Arc::new([AtomicU64::new(0), AtomicU64::new(0)]);
    let timed_out = Arc::new(AtomicBool::new(false));

    let rt = Runtime::new(
        RuntimeConfig::new()
            .max_threads(2)
            .stack_size(256 * 1024)
            .quantum(Duration::from_millis(2)),
    )
    .unwrap();
    assert!(rt.is_preemptive());

    for me in 0..2 {
        let counters = counters.clone();
        let timed_out = timed_out.clone();
        rt.create(move |_| {
            let other = 1 - me;
            let start = Instant::now();
            loop {
                let mine = counters[me].fetch_add(1, Ordering::Relaxed) + 1;
                if mine >= TARGET && counters[other].load(Ordering::Relaxed) > 0 {
                    break;
                }
                if start.elapsed() > Duration::from_secs(10) {
                    timed_out.store(true, Ordering::Relaxed);
                    break;
                }
            }
        })
        .unwrap();
    }
    rt.wait_all();

    assert!(!timed_out.load(Ordering::Relaxed));
    assert!(counters[0].load(Ordering::Relaxed) >= TARGET);
    assert!(counters[1].load(Ordering::Relaxed) >= TARGET);
    assert!(rt.preemptions() > 0);
    assert_eq!(rt.live_count(), 0);
}

/// Quanta that expire inside a runtime call are served late, and every thread
/// still completes.
#[test]
fn test_quantum_inside_runtime_call_is_deferred() {
    let _timer = TIMER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    const THREADS: usize = 4;
    const ROUNDS: u64 = 200;
    let finished = Arc::new(AtomicU64::new(0));
    let timed_out = Arc::new(AtomicBool::new(false));

    let rt = Runtime::new(
        RuntimeConfig::new()
            .max_threads(THREADS)
            .stack_size(256 * 1024)
            .quantum(Duration::from_micros(200)),
    )
    .unwrap();

    for _ in 0..THREADS {
        let finished = finished.clone();
        let timed_out = timed_out.clone();
        rt.create(move |rt| {
            let start = Instant::now();
            let mut rounds = 0;
            // Snapshots run with the gate closed for most of each round.
            while rounds < ROUNDS || rt.deferred_preemptions() == 0 {
                std::hint::black_box(rt.threads());
                rounds += 1;
                if start.elapsed() > Duration::from_secs(10) {
                    timed_out.store(true, Ordering::Relaxed);
                    break;
                }
            }
            finished.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    }
    rt.wait_all();

    assert!(!timed_out.load(Ordering::Relaxed));
    assert_eq!(finished.load(Ordering::Relaxed), THREADS as u64);
    assert!(rt.deferred_preemptions() > 0);
    assert!(rt.preemptions() > 0);
    assert_eq!(rt.live_count(), 0);
}

/// Dropping a preemptive runtime cancels the quantum timer.
#[test]
fn test_drop_cancels_timer() {
    let _timer = TIMER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let remaining = || unsafe {
        let mut timer: libc::itimerval = std::mem::zeroed();
        assert_eq!(libc::getitimer(libc::ITIMER_REAL, &mut timer), 0);
        (timer.it_value.tv_sec, timer.it_value.tv_usec)
    };

    let rt = Runtime::new(RuntimeConfig::new().quantum(Duration::from_secs(5))).unwrap();
    assert_ne!(remaining(), (0, 0));
    drop(rt);
    assert_eq!(remaining(), (0, 0));
}

/// Only one runtime at a time may own the timer.
#[test]
fn test_timer_has_single_owner() {
    let _timer = TIMER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let preemptive = || RuntimeConfig::new().quantum(Duration::from_millis(50));

    let first = Runtime::new(preemptive()).unwrap();
    assert_eq!(
        Runtime::new(preemptive()).err(),
        Some(ThreadError::PreemptionInUse)
    );

    let cooperative = Runtime::new(RuntimeConfig::new()).unwrap();
    assert!(!cooperative.is_preemptive());

    drop(first);
    let second = Runtime::new(preemptive()).unwrap();
    assert!(second.is_preemptive());
}

/// The stack-depth demo finishes under a short quantum.
#[test]
fn test_stack_depth_demo_under_preemption() {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_stack_depth"))
        .arg("2")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let steps = stdout.lines().filter(|line| line.contains(" step ")).count();
    assert_eq!(steps, 20 * 30 + 20 * 10);
    assert!(stdout.lines().any(|line| line.ends_with(" preemptions")));
}
