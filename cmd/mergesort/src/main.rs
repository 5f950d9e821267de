//! Parallel merge sort
//!
//! Every split forks two joinable threads and merges what they return.

use lwt::{create, join, LwtFlags};
use std::time::Instant;

fn merge(left: Vec<i64>, right: Vec<i64>) -> Vec<i64> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut l, mut r) = (left.into_iter().peekable(), right.into_iter().peekable());
    loop {
        let take_left = match (l.peek(), r.peek()) {
            (Some(a), Some(b)) => a <= b,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return out,
        };
        out.extend(if take_left { l.next() } else { r.next() });
    }
}

fn sort(mut values: Vec<i64>) -> Vec<i64> {
    if values.len() <= 1 {
        return values;
    }
    let right = values.split_off(values.len() / 2);
    let l = create(move || sort(values), LwtFlags::JOINABLE).expect("fork left");
    let r = create(move || sort(right), LwtFlags::JOINABLE).expect("fork right");
    let left = join::<Vec<i64>>(&l).expect("join left");
    let right = join::<Vec<i64>>(&r).expect("join right");
    merge(left, right)
}

fn main() {
    println!("=== LWT Merge Sort Example ===\n");

    let len: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(80);

    let mut seed = 0x9e37_79b9_7f4a_7c15_u64;
    let values: Vec<i64> = (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % 1000) as i64 - 500
        })
        .collect();

    let start = Instant::now();
    let sorted = sort(values);
    let elapsed = start.elapsed();

    let ok = sorted.windows(2).all(|w| w[0] <= w[1]);
    if len <= 100 {
        println!("{:?}\n", sorted);
    }

    println!("=== Results ===");
    println!("Elements:     {}", len);
    println!("Sorted:       {}", ok);
    println!("Time:         {:?}", elapsed);

    println!("\n=== Example Complete ===");
    if !ok {
        std::process::exit(1);
    }
}
