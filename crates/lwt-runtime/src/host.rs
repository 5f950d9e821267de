//! Hosts
//!
//! A host is one OS thread's scheduler plus the channels and groups that
//! live on it. The host-local part ([`HostState`]) is only ever touched by
//! that OS thread. The shared part ([`HostShared`]) is what other hosts
//! hold: an id, the remote queue, the parker and a closed flag.
//!
//! The reaper is an ordinary LWT that runs whenever nothing else is
//! runnable. It applies remote ops one at a time, and parks the OS thread
//! when both the run queue and the remote queue are empty.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lwt_core::kprint::{self, LogLevel};
use lwt_core::{kdebug, kerror, ktrace, HostId, LwtError, LwtId, LwtResult, LwtStatus, Slab};

use crate::channel::ChanState;
use crate::config::{self, RuntimeConfig};
use crate::group::GroupState;
use crate::parking::Parker;
use crate::remote::{Ack, Completion, Inbox, RemoteOp, RemoteOpKind, RemoteQueue};
use crate::scheduler::{reaper_entry, LwtCb, Sched};
use crate::stack::StackPool;

/// Log and abort on a broken internal invariant
#[cold]
pub(crate) fn fatal(msg: &str) -> ! {
    kerror!("fatal: {}", msg);
    std::process::abort()
}

/// The part of a host other OS threads may touch
pub(crate) struct HostShared {
    pub(crate) id: HostId,
    pub(crate) queue: RemoteQueue,
    pub(crate) parker: Parker,
    closed: AtomicBool,
}

impl HostShared {
    fn new(queue_capacity: usize) -> Self {
        Self {
            id: HostId::next(),
            queue: RemoteQueue::new(queue_capacity),
            parker: Parker::new(),
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.parker.unpark();
    }

    /// Push without retrying; hands the op back if the queue is full
    pub(crate) fn try_post(&self, op: RemoteOp) -> Result<(), RemoteOp> {
        self.queue.push(op)?;
        self.parker.unpark();
        Ok(())
    }
}

impl fmt::Debug for HostShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostShared")
            .field("id", &self.id)
            .field("pending", &self.queue.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Everything only the owning OS thread may touch
pub(crate) struct HostState {
    pub(crate) sched: Sched,
    pub(crate) chans: Slab<ChanState>,
    pub(crate) groups: Slab<GroupState>,
}

pub(crate) struct Host {
    pub(crate) shared: Arc<HostShared>,
    pub(crate) state: RefCell<HostState>,
    inbox: Inbox,
    pub(crate) stacks: StackPool,
    pub(crate) config: &'static RuntimeConfig,
}

impl Host {
    /// Adopt the calling OS thread as a host. Failure is fatal.
    pub(crate) fn bootstrap() -> Host {
        match Host::try_bootstrap() {
            Ok(host) => host,
            Err(e) => {
                kerror!("host bootstrap failed: {}", e);
                panic!("lwt: host bootstrap failed: {}", e);
            }
        }
    }

    fn try_bootstrap() -> LwtResult<Host> {
        kprint::init();
        let config = config::config();
        if config.debug_logging && !kprint::level_enabled(LogLevel::Debug) {
            kprint::set_log_level(LogLevel::Debug);
        }

        let shared = Arc::new(HostShared::new(config.remote_queue_capacity));
        let inbox = Inbox::claim(&shared).ok_or(LwtError::HostSpawn)?;
        let stacks = StackPool::new(config.stack_size);

        let mut lwts = Slab::with_capacity(config.pool_size + 2);
        let boot_cb = LwtCb::bootstrap();
        let boot_id = boot_cb.id;
        let bootstrap = lwts.insert(boot_cb);

        let mut reaper_cb = LwtCb::pooled(stacks.allocate()?);
        reaper_cb.id = LwtId::next();
        reaper_cb.status = LwtStatus::ReaperReady;
        reaper_cb.prime(reaper_entry);
        let reaper = lwts.insert(reaper_cb);

        let mut sched = Sched::new(lwts, bootstrap, reaper);
        for _ in 0..config.pool_size {
            let key = sched.lwts.insert(LwtCb::pooled(stacks.allocate()?));
            sched.ready_pool.push(key);
        }

        kprint::set_context(shared.id.as_u32(), boot_id.as_u32());
        kdebug!(
            "host {} up: {} pooled, {} KB stacks",
            shared.id,
            config.pool_size,
            stacks.stack_size() / 1024
        );

        Ok(Host {
            shared,
            state: RefCell::new(HostState {
                sched,
                chans: Slab::new(),
                groups: Slab::new(),
            }),
            inbox,
            stacks,
            config,
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> HostId {
        self.shared.id
    }

    /// Post an op to another host, yielding while its queue is full
    pub(crate) fn post(
        &self,
        target: &Arc<HostShared>,
        kind: RemoteOpKind,
        completion: Option<Arc<Completion>>,
    ) -> LwtResult<()> {
        let mut op = RemoteOp {
            kind,
            origin: self.current(),
            completion,
        };
        loop {
            if target.is_closed() {
                return Err(LwtError::HostGone);
            }
            match target.try_post(op) {
                Ok(()) => return Ok(()),
                Err(back) => {
                    op = back;
                    ktrace!("remote queue of {} full, retrying", target.id);
                    // The target may itself be waiting on room in our queue
                    self.drain_inbox();
                    self.yield_now();
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Post an op and block (Blocked) until the target has applied it
    pub(crate) fn post_blocking(
        &self,
        target: &Arc<HostShared>,
        kind: RemoteOpKind,
    ) -> LwtResult<Ack> {
        let completion = Arc::new(Completion::new());
        self.post(target, kind, Some(Arc::clone(&completion)))?;
        loop {
            if let Some(outcome) = completion.outcome() {
                return outcome;
            }
            self.park_current(LwtStatus::Blocked);
        }
    }

    /// Apply every op already queued for this host from the calling thread
    pub(crate) fn drain_inbox(&self) {
        while let Some(op) = self.inbox.pop() {
            self.apply(op);
        }
    }

    /// Body of the reaper thread
    pub(crate) fn reap(&self) -> ! {
        loop {
            match self.inbox.pop() {
                Some(op) => self.apply(op),
                None => {
                    let idle = self.state.borrow().sched.run_queue.is_empty();
                    if idle {
                        let queue = &self.shared.queue;
                        self.shared.parker.park(|| !queue.is_empty());
                    }
                }
            }
            self.park_current(LwtStatus::ReaperReady);
        }
    }

    fn apply(&self, op: RemoteOp) {
        let RemoteOp {
            kind,
            origin,
            completion,
        } = op;
        let name = kind.name();
        ktrace!("apply {} from {}", name, origin);

        let result = match kind {
            RemoteOpKind::Signal(t) => {
                if self.is_local(&t.host) {
                    self.state.borrow_mut().sched.wake(t.key);
                }
                Ok(Ack::Applied)
            }
            RemoteOpKind::AddSender { chan, sender } => {
                self.chan_add_sender_local(&chan, sender).map(|()| Ack::Applied)
            }
            RemoteOpKind::RemoveSender { chan, sender } => {
                self.chan_release_local(&chan, &sender).map(|()| Ack::Applied)
            }
            RemoteOpKind::AddBlockedSender { chan, parcel } => self.chan_offer_local(&chan, parcel),
            RemoteOpKind::AddChannelToGroup { group, chan } => {
                self.group_add_local(&group, &chan).map(|()| Ack::Applied)
            }
            RemoteOpKind::RemoveChannelFromGroup { group, chan } => {
                self.group_remove_local(&group, &chan).map(|()| Ack::Applied)
            }
        };

        match completion {
            Some(completion) => {
                completion.complete(result);
                self.signal(&origin);
            }
            None => {
                if let Err(e) = result {
                    kdebug!("{} from {} failed: {}", name, origin, e);
                }
            }
        }
    }

    /// Close the host and fail whatever is still queued for it
    pub(crate) fn shutdown(&self) {
        self.shared.close();
        self.fail_pending();
        kdebug!("host {} closed", self.shared.id);
    }

    fn fail_pending(&self) {
        while let Some(op) = self.inbox.pop() {
            let RemoteOp {
                kind,
                origin,
                completion,
            } = op;
            let Some(completion) = completion else {
                continue;
            };
            completion.complete(Err(LwtError::HostGone));
            if self.is_local(&origin.host) {
                continue;
            }
            ktrace!("failing {} from {}", kind.name(), origin);
            let wake = RemoteOp {
                kind: RemoteOpKind::Signal(origin.clone()),
                origin: origin.clone(),
                completion: None,
            };
            if origin.host.try_post(wake).is_err() {
                kerror!("could not wake {} on {}: queue full", origin, origin.host.id);
            }
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shared.close();
        self.fail_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::with_host;

    #[test]
    fn test_bootstrap_layout() {
        with_host(|h| {
            let st = h.state.borrow();
            let sched = &st.sched;
            assert_eq!(sched.current, sched.bootstrap);
            assert_ne!(sched.bootstrap, sched.reaper);
            assert_eq!(sched.status(sched.bootstrap), Some(LwtStatus::Runnable));
            assert_eq!(sched.status(sched.reaper), Some(LwtStatus::ReaperReady));
            assert_eq!(sched.ready_pool.len(), h.config.pool_size);
            assert_eq!(sched.live, 0);
            assert!(!h.shared.is_closed());
            // pool + reaper
            assert_eq!(h.stacks.allocated(), h.config.pool_size + 1);
        });
    }

    #[test]
    fn test_hosts_are_per_thread() {
        let here = with_host(Host::id);
        let there = std::thread::spawn(|| with_host(Host::id)).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(with_host(Host::id), here);
    }

    #[test]
    fn test_closed_host_rejects_posts() {
        let other = std::thread::spawn(|| with_host(|h| {
            h.shutdown();
            Arc::clone(&h.shared)
        }))
        .join()
        .unwrap();
        assert!(other.is_closed());

        let me = with_host(Host::current);
        let err = with_host(|h| h.post(&other, RemoteOpKind::Signal(me.clone()), None));
        assert_eq!(err, Err(LwtError::HostGone));
    }
}
