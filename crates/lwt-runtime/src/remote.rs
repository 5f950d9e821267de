//! Remote operations
//!
//! A host's scheduler, channel and group state is touched only by its own
//! OS thread. Other hosts affect it by pushing a [`RemoteOp`] onto the
//! host's [`RemoteQueue`]; the host's reaper drains it through the one
//! [`Inbox`] that exists per host and applies each op locally.
//!
//! Many producers, one consumer: pushing is open to anyone holding the
//! shared host, popping is only possible through `Inbox`, which is `!Send`
//! and can be claimed once.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam_queue::ArrayQueue;
use lwt_core::LwtResult;

use crate::channel::ChanHeader;
use crate::group::Group;
use crate::host::HostShared;
use crate::scheduler::Lwt;

/// Type-erased message or return value
pub(crate) type Payload = Box<dyn Any + Send>;

/// What an applied operation reports back to a blocking origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ack {
    /// Fully applied
    Applied,
    /// Parcel queued on the channel; the sender must wait on its ticket
    Queued,
}

/// Delivery state of one send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TicketState {
    Pending = 0,
    Delivered = 1,
    NoReceiver = 2,
}

/// Shared between a blocked sender and the channel's host
pub(crate) struct Ticket(AtomicU8);

impl Ticket {
    pub(crate) fn new() -> Self {
        Ticket(AtomicU8::new(TicketState::Pending as u8))
    }

    pub(crate) fn state(&self) -> TicketState {
        match self.0.load(Ordering::Acquire) {
            0 => TicketState::Pending,
            1 => TicketState::Delivered,
            _ => TicketState::NoReceiver,
        }
    }

    pub(crate) fn settle(&self, state: TicketState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// A payload waiting on a channel for its receiver
pub(crate) struct Parcel {
    pub(crate) sender: Lwt,
    pub(crate) payload: Payload,
    pub(crate) ticket: Arc<Ticket>,
}

/// Done flag plus outcome of a blocking operation
pub(crate) struct Completion(OnceLock<LwtResult<Ack>>);

impl Completion {
    pub(crate) fn new() -> Self {
        Completion(OnceLock::new())
    }

    pub(crate) fn complete(&self, result: LwtResult<Ack>) {
        let _ = self.0.set(result);
    }

    pub(crate) fn outcome(&self) -> Option<LwtResult<Ack>> {
        self.0.get().cloned()
    }
}

pub(crate) enum RemoteOpKind {
    /// Make a parked thread runnable
    Signal(Lwt),
    AddSender {
        chan: Arc<ChanHeader>,
        sender: Lwt,
    },
    RemoveSender {
        chan: Arc<ChanHeader>,
        sender: Lwt,
    },
    /// Offer a parcel to a channel's receiver
    AddBlockedSender {
        chan: Arc<ChanHeader>,
        parcel: Parcel,
    },
    AddChannelToGroup {
        group: Group,
        chan: Arc<ChanHeader>,
    },
    RemoveChannelFromGroup {
        group: Group,
        chan: Arc<ChanHeader>,
    },
}

impl RemoteOpKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            RemoteOpKind::Signal(_) => "signal",
            RemoteOpKind::AddSender { .. } => "add-sender",
            RemoteOpKind::RemoveSender { .. } => "remove-sender",
            RemoteOpKind::AddBlockedSender { .. } => "add-blocked-sender",
            RemoteOpKind::AddChannelToGroup { .. } => "group-add",
            RemoteOpKind::RemoveChannelFromGroup { .. } => "group-remove",
        }
    }
}

pub(crate) struct RemoteOp {
    pub(crate) kind: RemoteOpKind,
    pub(crate) origin: Lwt,
    /// Present iff the origin waits for the op to be applied
    pub(crate) completion: Option<Arc<Completion>>,
}

impl fmt::Debug for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteOp")
            .field("kind", &self.kind.name())
            .field("origin", &self.origin.id())
            .field("blocking", &self.completion.is_some())
            .finish()
    }
}

/// Bounded MPSC queue of inbound operations
pub(crate) struct RemoteQueue {
    ring: ArrayQueue<RemoteOp>,
    /// Diagnostic counters; compared with wrapping arithmetic only
    posted: AtomicU32,
    applied: AtomicU32,
    inbox_claimed: AtomicBool,
}

impl RemoteQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self::with_counters(capacity, 0)
    }

    fn with_counters(capacity: usize, start: u32) -> Self {
        Self {
            ring: ArrayQueue::new(capacity.max(1)),
            posted: AtomicU32::new(start),
            applied: AtomicU32::new(start),
            inbox_claimed: AtomicBool::new(false),
        }
    }

    /// Enqueue, or hand the op back if the queue is full
    pub(crate) fn push(&self, op: RemoteOp) -> Result<(), RemoteOp> {
        self.ring.push(op)?;
        self.posted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn pop(&self) -> Option<RemoteOp> {
        let op = self.ring.pop()?;
        self.applied.fetch_add(1, Ordering::AcqRel);
        Some(op)
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Ops posted but not yet drained. Exact only when producers are quiet.
    pub(crate) fn pending(&self) -> u32 {
        let applied = self.applied.load(Ordering::Acquire);
        self.posted.load(Ordering::Acquire).wrapping_sub(applied)
    }
}

/// The consumer end of one host's remote queue
pub(crate) struct Inbox {
    shared: Arc<HostShared>,
    _not_send: PhantomData<*const ()>,
}

impl Inbox {
    /// Claim the consumer end; `None` if it was already claimed
    pub(crate) fn claim(shared: &Arc<HostShared>) -> Option<Inbox> {
        if shared.queue.inbox_claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Inbox {
            shared: Arc::clone(shared),
            _not_send: PhantomData,
        })
    }

    #[inline]
    pub(crate) fn pop(&self) -> Option<RemoteOp> {
        self.shared.queue.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_states() {
        let t = Ticket::new();
        assert_eq!(t.state(), TicketState::Pending);
        t.settle(TicketState::Delivered);
        assert_eq!(t.state(), TicketState::Delivered);
        t.settle(TicketState::NoReceiver);
        assert_eq!(t.state(), TicketState::NoReceiver);
    }

    #[test]
    fn test_completion_set_once() {
        let c = Completion::new();
        assert!(c.outcome().is_none());
        c.complete(Ok(Ack::Queued));
        c.complete(Ok(Ack::Applied));
        assert_eq!(c.outcome(), Some(Ok(Ack::Queued)));
    }

    #[test]
    fn test_pending_across_counter_wrap() {
        let q = RemoteQueue::with_counters(4, u32::MAX - 1);
        assert_eq!(q.pending(), 0);

        // posted wraps past u32::MAX while applied has not
        q.posted.fetch_add(3, Ordering::AcqRel);
        assert_eq!(q.posted.load(Ordering::Relaxed), 1);
        assert_eq!(q.pending(), 3);

        q.applied.fetch_add(3, Ordering::AcqRel);
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn test_capacity_floor() {
        assert_eq!(RemoteQueue::new(0).capacity(), 1);
        assert_eq!(RemoteQueue::new(8).capacity(), 8);
    }
}
