//! Host threads
//!
//! `kthd_create` starts a new OS thread, bootstraps a host on it and
//! creates the first LWT there, registered as a sender on a channel the
//! caller passes in. That channel is how the new host talks back.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use lwt_core::{kdebug, kerror, LwtError, LwtFlags, LwtResult, LwtStatus};

use crate::channel::{create_with_channel, Chan};
use crate::config::config;
use crate::scheduler::{current, signal, Lwt};
use crate::tls::with_host;

static NEXT_HOST_THREAD: AtomicUsize = AtomicUsize::new(1);

/// Published once by the new host: whether its first thread was created
type Handshake = Arc<OnceLock<LwtResult<()>>>;

/// Start a new host running `f` as its first thread
///
/// `f` gets a handle to `chan` and is registered as one of its senders
/// before it first runs. Returns once the new host has either created the
/// thread or failed to; the calling thread is parked (Blocked) meanwhile.
pub fn kthd_create<T, F, R>(f: F, chan: &Chan<T>, flags: LwtFlags) -> LwtResult<()>
where
    T: Any + Send,
    F: FnOnce(Chan<T>) -> R + Send + 'static,
    R: Any + Send,
{
    let handshake: Handshake = Arc::new(OnceLock::new());
    let parent = current();
    let name = format!(
        "{}-{}",
        config().host_thread_prefix,
        NEXT_HOST_THREAD.fetch_add(1, Ordering::Relaxed)
    );

    let chan = chan.clone();
    let published = Arc::clone(&handshake);
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || host_main(f, chan, flags, parent, published))
        .map_err(|e| {
            kerror!("failed to spawn {}: {}", name, e);
            LwtError::HostSpawn
        })?;

    loop {
        if let Some(result) = handshake.get() {
            return result.clone();
        }
        with_host(|h| h.park_current(LwtStatus::Blocked));
    }
}

fn host_main<T, F, R>(f: F, chan: Chan<T>, flags: LwtFlags, parent: Lwt, handshake: Handshake)
where
    T: Any + Send,
    F: FnOnce(Chan<T>) -> R + Send + 'static,
    R: Any + Send,
{
    let result = create_with_channel(f, &chan, flags).map(|_| ());
    drop(chan);
    if let Err(e) = &result {
        kdebug!("first thread failed: {}", e);
    }
    let failed = result.is_err();
    let _ = handshake.set(result);
    signal(&parent);

    with_host(|h| {
        if !failed {
            h.wait_drained();
        }
        h.shutdown();
    });
}

/// Check if the calling OS thread is a host started by `kthd_create`
pub fn is_host_thread() -> bool {
    let prefix = &config().host_thread_prefix;
    thread::current()
        .name()
        .is_some_and(|n| n.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{info, join};

    #[test]
    fn test_remote_sender_reaches_local_receiver() {
        let c = Chan::<u64>::new(0);
        kthd_create(
            |c| {
                assert!(is_host_thread());
                for i in 0..100 {
                    c.send(i).unwrap();
                }
                c.deref().unwrap();
            },
            &c,
            LwtFlags::JOINABLE,
        )
        .unwrap();

        let mut sum = 0;
        loop {
            match c.receive() {
                Ok(v) => sum += v,
                Err(LwtError::NoSenders) => break,
                Err(e) => panic!("unexpected: {}", e),
            }
        }
        assert_eq!(sum, 4950);
        assert!(!is_host_thread());
    }

    #[test]
    fn test_async_channel_across_hosts() {
        let c = Chan::<u32>::new(4);
        for base in [0u32, 1000] {
            kthd_create(
                move |c| {
                    for i in 0..500 {
                        c.send(base + i).unwrap();
                    }
                },
                &c,
                LwtFlags::NOJOIN,
            )
            .unwrap();
        }

        let (mut low, mut high) = (Vec::new(), Vec::new());
        for _ in 0..1000 {
            let v = c.receive().unwrap();
            if v < 1000 {
                low.push(v);
            } else {
                high.push(v - 1000);
            }
        }
        // Per-sender FIFO survives the hop
        let expect: Vec<u32> = (0..500).collect();
        assert_eq!(low, expect);
        assert_eq!(high, expect);
    }

    #[test]
    fn test_failed_first_thread_is_reported() {
        let c = Chan::<u8>::new(0);
        let stale = c.clone();
        c.deref().unwrap();
        assert_eq!(
            kthd_create(|_c| (), &stale, LwtFlags::JOINABLE),
            Err(LwtError::StaleChannel)
        );
        assert_eq!(info(LwtStatus::Blocked), 0);
    }

    #[test]
    fn test_remote_thread_cannot_be_joined() {
        let c = Chan::<Lwt>::new(0);
        kthd_create(|c| c.send(current()).unwrap(), &c, LwtFlags::JOINABLE).unwrap();
        let remote = c.receive().unwrap();
        assert_ne!(remote.host_id(), current().host_id());
        assert_eq!(join::<()>(&remote), Err(LwtError::ForeignThread));
    }
}
