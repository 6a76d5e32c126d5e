//! Five threads take turns printing their progress, then main returns.
//!
//! Usage: `round_robin [EXIT_CODE] [--preempt MS] [--scan] [--verbose]`

use std::env;
use std::process;
use std::time::Duration;
use ult_runtime::{ult_println, Policy, Runtime, RuntimeConfig};

const THREADS: usize = 5;
const ITERATIONS: usize = 10;
const USAGE: &str = "usage: round_robin [EXIT_CODE] [--preempt MS] [--scan] [--verbose]";

struct Options {
    code: i32,
    quantum: Duration,
    policy: Policy,
    verbose: bool,
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options {
        code: 0,
        quantum: Duration::ZERO,
        policy: Policy::Fifo,
        verbose: false,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--preempt" => {
                let ms = args
                    .next()
                    .ok_or("--preempt needs a value")?
                    .parse::<u64>()
                    .map_err(|err| format!("bad quantum: {err}"))?;
                options.quantum = Duration::from_millis(ms);
            }
            "--scan" => options.policy = Policy::CircularScan,
            "--verbose" => options.verbose = true,
            code => {
                options.code = code
                    .parse()
                    .map_err(|err| format!("bad exit code {code:?}: {err}"))?;
            }
        }
    }
    Ok(options)
}

fn main() {
    let options = parse_args().unwrap_or_else(|msg| {
        eprintln!("round_robin: {msg}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let config = RuntimeConfig::new()
        .max_threads(THREADS)
        .quantum(options.quantum)
        .policy(options.policy)
        .verbose(options.verbose);
    let runtime = Runtime::new(config).unwrap_or_else(|err| {
        eprintln!("round_robin: {err}");
        process::exit(1);
    });

    for _ in 0..THREADS {
        let created = runtime.create(|rt| {
            let id = rt.current_id();
            for i in 0..ITERATIONS {
                ult_println!("thread {} iteration {}", id, i);
                rt.yield_now();
            }
        });
        if let Err(err) = created {
            eprintln!("round_robin: {err}");
            process::exit(1);
        }
    }

    runtime.process_return(options.code);
}
