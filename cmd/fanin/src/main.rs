//! Bounded fan-in example
//!
//! Many workers send one value each into a single buffered channel that
//! the main thread drains.

use lwt::{create_with_channel, join, kinfo, Chan, Lwt, LwtFlags};
use std::time::Instant;

fn main() {
    println!("=== LWT Fan-In Example ===\n");

    let workers: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(80);
    let capacity = workers.min(64);

    println!("Workers: {}, channel capacity: {}\n", workers, capacity);

    let results = Chan::<usize>::new(capacity);
    let start = Instant::now();

    let handles: Vec<Lwt> = (1..=workers)
        .map(|index| {
            create_with_channel(
                move |out| out.send(index % workers + 1),
                &results,
                LwtFlags::JOINABLE,
            )
            .expect("create worker")
        })
        .collect();

    let spawn_time = start.elapsed();
    let total: usize = (0..workers)
        .map(|_| results.receive().expect("receive"))
        .sum();

    for h in &handles {
        if let Err(e) = join::<lwt::LwtResult<()>>(h).expect("join worker") {
            kinfo!("worker {} failed to send: {}", h, e);
        }
    }
    let total_time = start.elapsed();

    println!("=== Results ===");
    println!("Sum:          {} (expected {})", total, workers * (workers + 1) / 2);
    println!("Spawn time:   {:?}", spawn_time);
    println!("Total time:   {:?}", total_time);

    println!("\n=== Example Complete ===");
}
