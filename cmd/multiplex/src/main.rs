//! Group multiplexing example
//!
//! Each producer runs on its own host and sends its index over its own
//! channel. The main thread waits on a group holding every channel.

use lwt::{kdebug, kthd_create, yield_now, Chan, Group, LwtFlags};
use std::time::Instant;

const HOSTS: usize = 3;

fn main() {
    println!("=== LWT Group Multiplex Example ===\n");

    let iterations: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10_000);

    let group = Group::new();
    let chans: Vec<Chan<usize>> = (0..HOSTS)
        .map(|i| {
            let c = Chan::new(3);
            c.mark_set(i);
            group.add(&c).expect("group add");
            c
        })
        .collect();

    let start = Instant::now();
    for (i, c) in chans.iter().enumerate() {
        kthd_create(
            move |c| {
                for n in 0..iterations {
                    if n % 7 == 0 {
                        for _ in 0..(n % 8) {
                            yield_now();
                        }
                    }
                    if c.send(i).is_err() {
                        break;
                    }
                }
                kdebug!("producer {} done", i);
                let _ = c.deref();
            },
            c,
            LwtFlags::NOJOIN,
        )
        .expect("start host");
    }
    println!("Started {} hosts, {} messages each\n", HOSTS, iterations);

    let mut counts = [0usize; HOSTS];
    for _ in 0..HOSTS * iterations {
        let ready = group.wait().expect("group wait");
        let tag = ready.receive::<usize>().expect("receive");
        assert_eq!(tag, ready.mark(), "payload does not match channel mark");
        counts[tag] += 1;
    }
    let elapsed = start.elapsed();

    for c in &chans {
        group.remove(c).expect("group remove");
    }
    group.free().expect("group free");

    println!("=== Results ===");
    for (i, n) in counts.iter().enumerate() {
        println!("Host {}:       {}", i + 1, n);
    }
    println!("Time:         {:?}", elapsed);
    println!(
        "Throughput:   {:.0} msgs/sec",
        (HOSTS * iterations) as f64 / elapsed.as_secs_f64()
    );

    println!("\n=== Example Complete ===");
}
