//! Ping-pong example
//!
//! Two threads bounce a counter over a pair of rendezvous channels. The
//! pong side sends its own channel back over the ping channel first.

use lwt::{create_with_channel, join, Chan, LwtFlags};
use std::time::Instant;

enum Msg {
    Peer(Chan<Msg>),
    Count(u64),
}

fn main() {
    println!("=== LWT Ping-Pong Example ===\n");

    let rounds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);

    let ping = Chan::<Msg>::new(0);
    let start = Instant::now();

    let pong_thread = create_with_channel(
        move |ping| {
            let inbox = Chan::<Msg>::new(0);
            if ping.send(Msg::Peer(inbox.clone())).is_err() {
                return 0;
            }
            loop {
                match inbox.receive() {
                    Ok(Msg::Count(n)) if n >= rounds => return n,
                    Ok(Msg::Count(n)) => {
                        if ping.send(Msg::Count(n + 1)).is_err() {
                            return n;
                        }
                    }
                    Ok(Msg::Peer(_)) | Err(_) => return 0,
                }
            }
        },
        &ping,
        LwtFlags::JOINABLE,
    )
    .expect("create pong");

    let pong = match ping.receive().expect("peer channel") {
        Msg::Peer(chan) => chan,
        Msg::Count(_) => panic!("expected the peer channel first"),
    };
    pong.register_sender().expect("register on pong");

    let mut value = 1;
    loop {
        pong.send(Msg::Count(value)).expect("send to pong");
        if value >= rounds {
            break;
        }
        match ping.receive().expect("receive from pong") {
            Msg::Count(n) => {
                if n % 10 == 0 {
                    println!("[Ping] got {}", n);
                }
                value = n + 1;
            }
            Msg::Peer(_) => panic!("unexpected peer"),
        }
    }

    let last = join::<u64>(&pong_thread).expect("join pong");
    let elapsed = start.elapsed();

    println!("\n=== Results ===");
    println!("Rounds:       {}", rounds);
    println!("Pong saw:     {}", last);
    println!("Time:         {:?}", elapsed);
    println!("Per message:  {:?}", elapsed / (2 * rounds as u32).max(1));

    println!("\n=== Example Complete ===");
}
