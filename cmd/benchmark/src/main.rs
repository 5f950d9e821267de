//! Scheduler benchmark
//!
//! Times fork/join of trivial threads, plain yields and directed yields.

use lwt::{create, info, join, yield_now, yield_to, current, LwtFlags, LwtStatus};
use std::time::{Duration, Instant};

fn report(name: &str, ops: u64, elapsed: Duration) {
    println!(
        "{:<16} {:>10} ops  {:>10.1?}  {:>8.1} ns/op",
        name,
        ops,
        elapsed,
        elapsed.as_nanos() as f64 / ops.max(1) as f64
    );
}

fn bench_fork_join(iterations: u64) -> Duration {
    let start = Instant::now();
    for i in 0..iterations {
        let t = create(move || i, LwtFlags::JOINABLE).expect("create");
        let v = join::<u64>(&t).expect("join");
        debug_assert_eq!(v, i);
    }
    start.elapsed()
}

fn bench_yield(iterations: u64) -> Duration {
    let partner = create(
        move || {
            for _ in 0..iterations {
                yield_now();
            }
        },
        LwtFlags::JOINABLE,
    )
    .expect("create partner");

    let start = Instant::now();
    for _ in 0..iterations {
        yield_now();
    }
    let elapsed = start.elapsed();
    join::<()>(&partner).expect("join partner");
    elapsed
}

fn bench_yield_to(iterations: u64) -> Duration {
    let me = current();
    let partner = create(
        move || {
            for _ in 0..iterations {
                let _ = yield_to(&me);
            }
        },
        LwtFlags::JOINABLE,
    )
    .expect("create partner");

    let start = Instant::now();
    for _ in 0..iterations {
        if yield_to(&partner).is_err() {
            break;
        }
    }
    let elapsed = start.elapsed();
    join::<()>(&partner).expect("join partner");
    elapsed
}

fn main() {
    println!("=== LWT Benchmark ===\n");

    let iterations: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(100_000);

    report("fork/join", iterations, bench_fork_join(iterations));
    // Each iteration is two switches
    report("yield", iterations * 2, bench_yield(iterations));
    report("yield_to", iterations * 2, bench_yield_to(iterations));

    println!("\nPooled control blocks: {}", info(LwtStatus::ReadyPool));
    println!("\n=== Benchmark Complete ===");
}
