//! Forty threads recurse to growing depths while the quantum timer preempts
//! them. Half of them yield now and then, the other half never do.
//!
//! Usage: `stack_depth [QUANTUM_MS]` (default 10, 0 for cooperative only)

use std::env;
use std::hint::black_box;
use std::process;
use std::thread;
use std::time::Duration;
use ult_runtime::{ult_println, Runtime, RuntimeConfig};

const PAIRS: usize = 20;

#[inline(never)]
fn descend(depth: usize) -> usize {
    let frame = black_box([depth as u8; 64]);
    if depth == 0 {
        return 0;
    }
    descend(depth - 1) + (frame[63] != 0) as usize
}

fn yielding_worker(rt: &Runtime) {
    let id = rt.current_id().get();
    for i in 0..30 {
        ult_println!("thread {} step {} depth {}", id, i, descend(i));
        thread::sleep(Duration::from_micros((20 * i * (id % 5 + 1)) as u64));
        if (i + id) % 5 == 0 {
            rt.yield_now();
        }
    }
}

fn busy_worker(rt: &Runtime) {
    let id = rt.current_id().get();
    for i in 0..10 {
        ult_println!("thread {} step {} depth {}", id, i, descend(i));
        thread::sleep(Duration::from_micros((10 * i * (id % 5 + 1)) as u64));
    }
}

fn main() {
    let quantum_ms = match env::args().nth(1) {
        Some(arg) => arg.parse::<u64>().unwrap_or_else(|err| {
            eprintln!("stack_depth: bad quantum {arg:?}: {err}");
            process::exit(2);
        }),
        None => 10,
    };

    let config = RuntimeConfig::new()
        .max_threads(2 * PAIRS)
        .quantum(Duration::from_millis(quantum_ms));
    let runtime = Runtime::new(config).unwrap_or_else(|err| {
        eprintln!("stack_depth: {err}");
        process::exit(1);
    });

    for _ in 0..PAIRS {
        for worker in [yielding_worker as fn(&Runtime), busy_worker] {
            if let Err(err) = runtime.create(worker) {
                eprintln!("stack_depth: {err}");
                process::exit(1);
            }
        }
    }

    runtime.wait_all();
    ult_println!("{} preemptions", runtime.preemptions());
    runtime.process_return(0);
}
