#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use std::cell::Cell;
use std::rc::Rc;
use ult_runtime::{Policy, Runtime, RuntimeConfig, ThreadError, ThreadState, MIN_STACK_SIZE};

#[derive(Debug, Arbitrary)]
struct Body {
    yields: u8,
    exit_early: bool,
    spawn_child: bool,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    Create(Body),
    Yield,
    WaitAll,
    Snapshot,
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    capacity: u8,
    circular_scan: bool,
    schedule_immediately: bool,
    operations: Vec<Operation>,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    if let Ok(scenario) = Scenario::arbitrary(&mut u) {
        run(scenario);
    }
});

fn check_invariants(rt: &Runtime) {
    let threads = rt.threads();
    let running: Vec<_> = threads
        .iter()
        .filter(|t| t.state == ThreadState::Running)
        .collect();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, rt.current_id());
    assert!(rt.live_count() <= rt.capacity());
    assert!(threads.iter().all(|t| t.state != ThreadState::Free));
    assert!(threads.windows(2).all(|pair| pair[0].slot < pair[1].slot));
}

fn body(plan: &Body, completed: Rc<Cell<usize>>) -> impl FnOnce(&Runtime) + 'static {
    let yields = plan.yields % 8;
    let exit_early = plan.exit_early;
    let spawn_child = plan.spawn_child;
    move |rt: &Runtime| {
        if spawn_child {
            let completed = completed.clone();
            // May legitimately fail when the pool is full.
            let _ = rt.create(move |_| completed.set(completed.get() + 1));
        }
        for round in 0..yields {
            check_invariants(rt);
            if exit_early && round == yields / 2 {
                completed.set(completed.get() + 1);
                rt.exit_current();
            }
            rt.yield_now();
        }
        completed.set(completed.get() + 1);
    }
}

fn run(scenario: Scenario) {
    let capacity = (scenario.capacity % 16) as usize + 1;
    let policy = if scenario.circular_scan {
        Policy::CircularScan
    } else {
        Policy::Fifo
    };
    let rt = Runtime::new(
        RuntimeConfig::new()
            .max_threads(capacity)
            .stack_size(MIN_STACK_SIZE * 4)
            .policy(policy)
            .schedule_immediately(scenario.schedule_immediately),
    )
    .unwrap();

    let completed = Rc::new(Cell::new(0usize));
    let mut last_id = None;

    for operation in scenario.operations.iter().take(256) {
        match operation {
            Operation::Create(plan) => {
                let full = rt.live_count() == capacity;
                match rt.create(body(plan, completed.clone())) {
                    Ok(id) => {
                        assert!(!full);
                        assert!(last_id.map_or(true, |last| id > last));
                        last_id = Some(id);
                    }
                    Err(err) => {
                        assert!(full);
                        assert_eq!(err, ThreadError::TooManyThreads);
                    }
                }
            }
            Operation::Yield => {
                let ready = rt.ready_count();
                assert_eq!(rt.yield_now(), ready > 0);
            }
            Operation::WaitAll => {
                rt.wait_all();
                assert_eq!(rt.live_count(), 0);
            }
            Operation::Snapshot => check_invariants(&rt),
        }
        check_invariants(&rt);
    }

    rt.wait_all();
    assert_eq!(rt.live_count(), 0);
    assert_eq!(rt.ready_count(), 0);
}
