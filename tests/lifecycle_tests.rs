//! End-to-end lifecycle tests through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ult_runtime::{
    Policy, Runtime, RuntimeConfig, ThreadError, ThreadId, ThreadState, MIN_STACK_SIZE,
};

fn small(config: RuntimeConfig) -> RuntimeConfig {
    config.stack_size(MIN_STACK_SIZE * 4)
}

/// Five threads, ten iterations each: fifty events in strict rotation.
#[test]
fn test_five_by_ten_rotation() {
    for policy in [Policy::Fifo, Policy::CircularScan] {
        let rt = Runtime::new(small(RuntimeConfig::new().max_threads(5).policy(policy))).unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..5 {
            let events = events.clone();
            rt.create(move |rt| {
                for i in 0..10 {
                    events.borrow_mut().push(format!("{}:{}", rt.current_id(), i));
                    rt.yield_now();
                }
            })
            .unwrap();
        }
        rt.wait_all();

        let expected: Vec<String> = (0..50)
            .map(|n| format!("{}:{}", n % 5 + 1, n / 5))
            .collect();
        assert_eq!(*events.borrow(), expected, "{:?}", policy);
    }
}

/// Slots are recycled across many generations of short-lived threads.
#[test]
fn test_slot_recycling_across_generations() {
    let rt = Runtime::new(small(RuntimeConfig::new().max_threads(8))).unwrap();
    let finished = Rc::new(Cell::new(0usize));
    let mut last_id = ThreadId::MAIN;

    for _generation in 0..50 {
        for _ in 0..8 {
            let finished = finished.clone();
            let id = rt
                .create(move |rt| {
                    rt.yield_now();
                    finished.set(finished.get() + 1);
                })
                .unwrap();
            assert!(id > last_id);
            last_id = id;
        }
        assert_eq!(
            rt.create(|_| {}),
            Err(ThreadError::TooManyThreads)
        );
        rt.wait_all();
        assert_eq!(rt.live_count(), 0);
    }

    assert_eq!(finished.get(), 400);
    assert_eq!(last_id.get(), 400);
}

/// A snapshot taken from a spawned thread shows everyone else Ready.
#[test]
fn test_thread_snapshot_from_worker() {
    let rt = Runtime::new(small(RuntimeConfig::new().max_threads(3))).unwrap();
    let snapshot = Rc::new(RefCell::new(Vec::new()));

    let inner = snapshot.clone();
    rt.create(move |rt| {
        *inner.borrow_mut() = rt.threads();
    })
    .unwrap();
    rt.create(|_| {}).unwrap();
    rt.wait_all();

    let snapshot = snapshot.borrow();
    let states: Vec<(usize, ThreadState)> = snapshot
        .iter()
        .map(|info| (info.id.get(), info.state))
        .collect();
    assert_eq!(
        states,
        [
            (0, ThreadState::Ready),
            (1, ThreadState::Running),
            (2, ThreadState::Ready),
        ]
    );
}

/// Threads that never yield run to completion one after another.
#[test]
fn test_non_yielding_threads_run_in_order() {
    let rt = Runtime::new(small(RuntimeConfig::new().max_threads(4))).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));

    for tag in ["a", "b", "c", "d"] {
        let order = order.clone();
        rt.create(move |_| {
            order.borrow_mut().push(tag);
            order.borrow_mut().push(tag);
        })
        .unwrap();
    }
    rt.wait_all();

    assert_eq!(*order.borrow(), ["a", "a", "b", "b", "c", "c", "d", "d"]);
}

/// Every thread's accounting covers at least the time it spent sleeping.
#[test]
fn test_execution_time_accounting() {
    let rt = Runtime::new(small(RuntimeConfig::new().max_threads(2))).unwrap();
    let times = Rc::new(RefCell::new(Vec::new()));

    for _ in 0..2 {
        let times = times.clone();
        rt.create(move |rt| {
            std::thread::sleep(std::time::Duration::from_millis(5));
            rt.yield_now();
            let stats = rt.stats(rt.current_id()).unwrap();
            times.borrow_mut().push(stats.execution_time);
        })
        .unwrap();
    }
    rt.wait_all();

    for time in times.borrow().iter() {
        assert!(*time >= std::time::Duration::from_millis(5), "{:?}", time);
    }
}

/// Error values render their messages.
#[test]
fn test_error_messages() {
    assert_eq!(
        ThreadError::TooManyThreads.to_string(),
        "Maximum number of threads reached"
    );
    assert_eq!(
        ThreadError::OutOfMemory.to_string(),
        "Not enough memory to create a new stack"
    );
}
