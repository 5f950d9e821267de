//! End-to-end scenarios through the public API
//!
//! Every `#[test]` runs on its own OS thread and therefore gets a fresh host.

use super::*;

const MAX_PING_PONG: u32 = 100;

enum Msg {
    Peer(Chan<Msg>),
    Count(u32),
}

#[test]
fn test_ping_pong_counter() {
    let ping = Chan::<Msg>::new(0);
    let pong_thread = create_with_channel(
        |ping| {
            let inbox = Chan::<Msg>::new(0);
            ping.send(Msg::Peer(inbox.clone())).unwrap();
            loop {
                match inbox.receive() {
                    Ok(Msg::Count(n)) if n >= MAX_PING_PONG => return n,
                    Ok(Msg::Count(n)) => ping.send(Msg::Count(n + 1)).unwrap(),
                    _ => return 0,
                }
            }
        },
        &ping,
        LwtFlags::JOINABLE,
    )
    .unwrap();

    let pong = match ping.receive().unwrap() {
        Msg::Peer(chan) => chan,
        Msg::Count(_) => panic!("expected the peer channel first"),
    };
    pong.register_sender().unwrap();

    let mut value = 1;
    let mut last_seen = 0;
    loop {
        pong.send(Msg::Count(value)).unwrap();
        if value >= MAX_PING_PONG {
            break;
        }
        match ping.receive().unwrap() {
            Msg::Count(n) => {
                last_seen = n;
                value = n + 1;
            }
            Msg::Peer(_) => panic!("unexpected peer"),
        }
    }

    assert_eq!(last_seen, MAX_PING_PONG);
    assert_eq!(join::<u32>(&pong_thread).unwrap(), MAX_PING_PONG + 1);
    assert!(is_quiescent());
}

#[test]
fn test_bounded_fan_in() {
    const WORKERS: usize = 80;
    let results = Chan::<usize>::new(WORKERS);
    let workers: Vec<Lwt> = (1..=WORKERS)
        .map(|index| {
            create_with_channel(
                move |out| out.send(index % WORKERS + 1).unwrap(),
                &results,
                LwtFlags::JOINABLE,
            )
            .unwrap()
        })
        .collect();

    let total: usize = (0..WORKERS).map(|_| results.receive().unwrap()).sum();
    assert_eq!(total, 3240);
    for w in &workers {
        join::<()>(w).unwrap();
    }
    assert!(is_quiescent());
}

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

fn parallel_sort(mut values: Vec<i64>) -> Vec<i64> {
    if values.len() <= 1 {
        return values;
    }
    let right = values.split_off(values.len() / 2);
    let l = create(move || parallel_sort(values), LwtFlags::JOINABLE).unwrap();
    let r = create(move || parallel_sort(right), LwtFlags::JOINABLE).unwrap();
    let left = join::<Vec<i64>>(&l).unwrap();
    let right = join::<Vec<i64>>(&r).unwrap();
    merge(left, right)
}

#[test]
fn test_parallel_merge_sort() {
    // xorshift; no need for a real RNG here
    let mut seed = 0x2545_f491_4f6c_dd1d_u64;
    let values: Vec<i64> = (0..80)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % 1000) as i64 - 500
        })
        .collect();

    let mut expected = values.clone();
    expected.sort();

    let sorted = parallel_sort(values);
    assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(sorted, expected);
    assert!(is_quiescent());
}

#[test]
fn test_group_multiplexing_across_hosts() {
    const HOSTS: usize = 3;
    const ITER: usize = 10_000;

    let group = Group::new();
    let chans: Vec<Chan<usize>> = (0..HOSTS)
        .map(|i| {
            let c = Chan::new(3);
            c.mark_set(i);
            group.add(&c).unwrap();
            c
        })
        .collect();

    for (i, c) in chans.iter().enumerate() {
        kthd_create(
            move |c| {
                for n in 0..ITER {
                    if n % 7 == 0 {
                        for _ in 0..(n % 8) {
                            yield_now();
                        }
                    }
                    c.send(i).unwrap();
                }
                c.deref().unwrap();
            },
            c,
            LwtFlags::NOJOIN,
        )
        .unwrap();
    }

    let mut counts = [0usize; HOSTS];
    for _ in 0..HOSTS * ITER {
        let ready = group.wait().unwrap();
        let tag = ready.receive::<usize>().unwrap();
        assert_eq!(tag, ready.mark());
        counts[tag] += 1;
    }
    assert_eq!(counts, [ITER; HOSTS]);

    for c in &chans {
        group.remove(c).unwrap();
    }
    group.free().unwrap();
}

#[test]
fn test_join_while_child_waits_on_another_host() {
    let control = Chan::<Chan<u32>>::new(0);
    kthd_create(
        |control| {
            let inbox = Chan::<u32>::new(1);
            control.send_chan(&inbox).unwrap();
            (0..50).map(|_| inbox.receive().unwrap()).sum::<u32>()
        },
        &control,
        LwtFlags::NOJOIN,
    )
    .unwrap();
    let remote = control.receive().unwrap();
    assert_ne!(remote.host_id(), current().host_id());

    // Every wakeup of the child comes back from the other host; the parent
    // is only woken by the child's exit.
    let child = create(
        move || {
            remote.register_sender().unwrap();
            for v in 1..=50u32 {
                remote.send(v).unwrap();
            }
            50u32
        },
        LwtFlags::JOINABLE,
    )
    .unwrap();

    assert_eq!(join::<u32>(&child).unwrap(), 50);
    assert!(is_quiescent());
    assert_eq!(join::<u32>(&child), Err(LwtError::StaleThread));
}

#[test]
fn test_signal_across_hosts() {
    let c = Chan::<Option<Lwt>>::new(0);
    kthd_create(
        |c| {
            c.send(Some(current())).unwrap();
            block(LwtStatus::Blocked).unwrap();
            c.send(None).unwrap();
        },
        &c,
        LwtFlags::NOJOIN,
    )
    .unwrap();

    let remote = c.receive().unwrap().unwrap();
    signal(&remote);
    assert!(c.receive().unwrap().is_none());
}

#[test]
fn test_fork_join_sequence() {
    let kids: Vec<Lwt> = (0..10u64)
        .map(|i| create(move || i * 3, LwtFlags::JOINABLE).unwrap())
        .collect();
    let ids: Vec<LwtId> = kids.iter().map(id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), kids.len());

    for (i, k) in kids.iter().enumerate() {
        assert_eq!(join::<u64>(k).unwrap(), i as u64 * 3);
    }
    assert!(is_quiescent());
}

#[test]
fn test_nojoin_threads_recycle_without_growth() {
    let pooled = info(LwtStatus::ReadyPool);
    for round in 0..50 {
        let c = Chan::<u32>::new(0);
        for _ in 0..4 {
            create_with_channel(move |c| c.send(round).unwrap(), &c, LwtFlags::NOJOIN).unwrap();
        }
        for _ in 0..4 {
            assert_eq!(c.receive().unwrap(), round);
        }
        c.deref().unwrap();
        yield_now();
    }
    assert_eq!(info(LwtStatus::ReadyPool), pooled);
    assert_eq!(info(InfoKind::Channels), 0);
    assert!(is_quiescent());
}

#[test]
fn test_error_codes() {
    let all = [
        LwtError::JoinSelf,
        LwtError::NotAChild,
        LwtError::NoReceiver,
        LwtError::NoSenders,
        LwtError::AlreadyGrouped,
        LwtError::NotInGroup,
        LwtError::GroupBusy,
        LwtError::HostGone,
    ];
    for e in all {
        assert_eq!(e.code(), -1, "{}", e);
    }
    assert_eq!(LwtError::EventsPending.code(), 1);
    assert!(LwtError::NoReceiver.is_protocol());
    assert!(LwtError::NoSenders.is_protocol());
    assert!(!LwtError::JoinSelf.is_protocol());
}

#[test]
fn test_sending_after_receiver_left() {
    let c = Chan::<u8>::new(2);
    let t = create_with_channel(|c| c.send(1), &c, LwtFlags::JOINABLE).unwrap();
    // The registered sender keeps the channel alive without a receiver
    c.deref().unwrap();
    assert_eq!(join::<LwtResult<()>>(&t).unwrap(), Err(LwtError::NoReceiver));
    assert_eq!(info(InfoKind::Channels), 0);
}
