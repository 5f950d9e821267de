//! Channels
//!
//! A channel lives on the host that created it; its creator is the one
//! receiver. Senders register explicitly (`create_with_channel`,
//! `receive_chan`, `register_sender`) and can live on any host.
//!
//! Capacity 0 is a rendezvous: every send parks until the receiver takes
//! the payload. Capacity N buffers up to N payloads in a ring and parks
//! senders only while the ring is full. Parked sends are queued as
//! [`Parcel`]s in FIFO order; the receiver moves a parcel's payload out,
//! settles its ticket and only then signals the sender.
//!
//! Every mutation of a channel happens on its own host. A sender on
//! another host ships its parcel over as an `AddBlockedSender` op.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lwt_core::{kdebug, ChanId, HostId, LwtError, LwtFlags, LwtResult, LwtStatus, SlotKey};

use crate::group::{clear_event, detach_member, raise_event};
use crate::host::{fatal, Host, HostShared, HostState};
use crate::remote::{Ack, Parcel, Payload, RemoteOpKind, Ticket, TicketState};
use crate::scheduler::{Entry, Lwt};
use crate::tls::with_host;

/// Immutable identity of a channel, shared by every handle
pub(crate) struct ChanHeader {
    pub(crate) id: ChanId,
    pub(crate) host: Arc<HostShared>,
    pub(crate) key: SlotKey,
    pub(crate) capacity: usize,
    mark: AtomicUsize,
}

impl fmt::Debug for ChanHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.host.id)
    }
}

/// Fixed-size FIFO of buffered payloads
pub(crate) struct Ring {
    slots: Vec<Option<Payload>>,
    head: usize,
    occupancy: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            occupancy: 0,
        }
    }

    #[inline]
    fn has_room(&self) -> bool {
        self.occupancy < self.slots.len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.occupancy
    }

    fn push(&mut self, payload: Payload) -> Result<(), Payload> {
        if !self.has_room() {
            return Err(payload);
        }
        let tail = (self.head + self.occupancy) % self.slots.len();
        self.slots[tail] = Some(payload);
        self.occupancy += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Payload> {
        if self.occupancy == 0 {
            return None;
        }
        let payload = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.occupancy -= 1;
        payload
    }

    fn drain_into(&mut self, out: &mut Vec<Payload>) {
        while let Some(p) = self.pop() {
            out.push(p);
        }
        self.head = 0;
    }
}

/// Host-local half of a channel
pub(crate) struct ChanState {
    pub(crate) receiver: Option<SlotKey>,
    /// A multiset: a thread registered twice must deref twice
    pub(crate) senders: Vec<Lwt>,
    pub(crate) blocked: VecDeque<Parcel>,
    pub(crate) ring: Ring,
    pub(crate) group: Option<SlotKey>,
    pub(crate) event_queued: bool,
}

impl ChanState {
    fn new(receiver: SlotKey, capacity: usize) -> Self {
        Self {
            receiver: Some(receiver),
            senders: Vec::new(),
            blocked: VecDeque::new(),
            ring: Ring::new(capacity),
            group: None,
            event_queued: false,
        }
    }

    /// Check if a receive would find something right now
    #[inline]
    pub(crate) fn has_data(&self) -> bool {
        self.ring.len() > 0 || !self.blocked.is_empty()
    }
}

impl Host {
    pub(crate) fn chan_open(&self, capacity: usize) -> Arc<ChanHeader> {
        let mut st = self.state.borrow_mut();
        let receiver = st.sched.current;
        let key = st.chans.insert(ChanState::new(receiver, capacity));
        let header = Arc::new(ChanHeader {
            id: ChanId::next(),
            host: Arc::clone(&self.shared),
            key,
            capacity,
            mark: AtomicUsize::new(0),
        });
        kdebug!("{:?} opened, capacity {}", header, capacity);
        header
    }

    /// Offer a parcel to the receiver of a channel on this host
    pub(crate) fn chan_offer_local(&self, header: &Arc<ChanHeader>, parcel: Parcel) -> LwtResult<Ack> {
        let mut st = self.state.borrow_mut();
        let HostState {
            sched,
            chans,
            groups,
        } = &mut *st;
        let chan = chans.get_mut(header.key).ok_or(LwtError::StaleChannel)?;
        let Some(receiver) = chan.receiver else {
            kdebug!("send on {:?}: no receiver", header);
            return Err(LwtError::NoReceiver);
        };

        let was_empty = !chan.has_data();
        let ack = if chan.blocked.is_empty() && chan.ring.has_room() {
            if chan.ring.push(parcel.payload).is_err() {
                fatal("ring full after room check");
            }
            Ack::Applied
        } else {
            chan.blocked.push_back(parcel);
            Ack::Queued
        };
        if was_empty {
            raise_event(sched, groups, chan, header);
        }
        sched.wake_if(receiver, LwtStatus::Receiving);
        Ok(ack)
    }

    pub(crate) fn chan_send(&self, header: &Arc<ChanHeader>, payload: Payload) -> LwtResult<()> {
        let ticket = Arc::new(Ticket::new());
        let parcel = Parcel {
            sender: self.current(),
            payload,
            ticket: Arc::clone(&ticket),
        };

        let local = self.is_local(&header.host);
        let ack = if local {
            self.chan_offer_local(header, parcel)?
        } else {
            let kind = RemoteOpKind::AddBlockedSender {
                chan: Arc::clone(header),
                parcel,
            };
            self.post_blocking(&header.host, kind)?
        };
        if ack == Ack::Applied {
            return Ok(());
        }

        let mut handoff = if local {
            self.state
                .borrow()
                .chans
                .get(header.key)
                .and_then(|c| c.receiver)
        } else {
            None
        };
        loop {
            match ticket.state() {
                TicketState::Delivered => return Ok(()),
                TicketState::NoReceiver => {
                    kdebug!("send on {:?}: receiver went away", header);
                    return Err(LwtError::NoReceiver);
                }
                TicketState::Pending => match handoff.take() {
                    Some(receiver) => self.park_and_handoff(LwtStatus::Sending, receiver),
                    None => self.park_current(LwtStatus::Sending),
                },
            }
        }
    }

    pub(crate) fn chan_receive(&self, header: &Arc<ChanHeader>) -> LwtResult<Payload> {
        if !self.is_local(&header.host) {
            return Err(LwtError::NotReceiver);
        }
        loop {
            let taken = {
                let mut st = self.state.borrow_mut();
                let HostState {
                    sched,
                    chans,
                    groups,
                } = &mut *st;
                let chan = chans.get_mut(header.key).ok_or(LwtError::StaleChannel)?;
                if chan.receiver != Some(sched.current) {
                    return Err(LwtError::NotReceiver);
                }

                let mut released = None;
                let payload = if header.capacity > 0 {
                    chan.ring.pop().map(|payload| {
                        // Refill from the oldest parked sender to keep FIFO order
                        if let Some(Parcel {
                            sender,
                            payload: next,
                            ticket,
                        }) = chan.blocked.pop_front()
                        {
                            if chan.ring.push(next).is_err() {
                                fatal("ring full after pop");
                            }
                            ticket.settle(TicketState::Delivered);
                            released = Some(sender);
                        }
                        payload
                    })
                } else {
                    match chan.blocked.pop_front() {
                        Some(Parcel {
                            sender,
                            payload,
                            ticket,
                        }) => {
                            ticket.settle(TicketState::Delivered);
                            released = Some(sender);
                            Some(payload)
                        }
                        None if chan.senders.is_empty() => {
                            kdebug!("receive on {:?}: no senders", header);
                            return Err(LwtError::NoSenders);
                        }
                        None => None,
                    }
                };

                match payload {
                    Some(payload) => {
                        if !chan.has_data() {
                            clear_event(groups, chan, header);
                        }
                        Some((payload, released))
                    }
                    None => {
                        sched.set_current_status(LwtStatus::Receiving);
                        None
                    }
                }
            };

            match taken {
                Some((payload, released)) => {
                    if let Some(sender) = released {
                        self.signal(&sender);
                    }
                    return Ok(payload);
                }
                None => self.schedule(),
            }
        }
    }

    pub(crate) fn chan_add_sender_local(&self, header: &Arc<ChanHeader>, sender: Lwt) -> LwtResult<()> {
        let mut st = self.state.borrow_mut();
        let chan = st.chans.get_mut(header.key).ok_or(LwtError::StaleChannel)?;
        chan.senders.push(sender);
        Ok(())
    }

    pub(crate) fn chan_add_sender(&self, header: &Arc<ChanHeader>, sender: Lwt) -> LwtResult<()> {
        if self.is_local(&header.host) {
            return self.chan_add_sender_local(header, sender);
        }
        let kind = RemoteOpKind::AddSender {
            chan: Arc::clone(header),
            sender,
        };
        self.post_blocking(&header.host, kind).map(|_| ())
    }

    /// Drop `who`'s hold on a channel on this host: its receivership if it
    /// is the receiver, otherwise one sender registration
    pub(crate) fn chan_release_local(&self, header: &Arc<ChanHeader>, who: &Lwt) -> LwtResult<()> {
        let mut failed = Vec::new();
        let mut dropped = Vec::new();
        {
            let mut st = self.state.borrow_mut();
            let HostState {
                sched,
                chans,
                groups,
            } = &mut *st;
            let chan = chans.get_mut(header.key).ok_or(LwtError::StaleChannel)?;

            if self.is_local(&who.host) && chan.receiver == Some(who.key) {
                chan.receiver = None;
                if let Some(group) = chan.group.take() {
                    detach_member(groups, group, header);
                }
                chan.event_queued = false;
                for parcel in chan.blocked.drain(..) {
                    parcel.ticket.settle(TicketState::NoReceiver);
                    dropped.push(parcel.payload);
                    failed.push(parcel.sender);
                }
                chan.ring.drain_into(&mut dropped);
            } else if let Some(pos) = chan.senders.iter().position(|s| s == who) {
                chan.senders.swap_remove(pos);
                if chan.senders.is_empty() {
                    if let Some(receiver) = chan.receiver {
                        sched.wake_if(receiver, LwtStatus::Receiving);
                    }
                }
            } else {
                return Err(LwtError::NotHolder);
            }

            if chan.receiver.is_none() && chan.senders.is_empty() {
                chans.remove(header.key);
                kdebug!("{:?} freed", header);
            }
        }
        drop(dropped);
        for sender in &failed {
            self.signal(sender);
        }
        Ok(())
    }

    pub(crate) fn chan_release(&self, header: &Arc<ChanHeader>) -> LwtResult<()> {
        let me = self.current();
        if self.is_local(&header.host) {
            return self.chan_release_local(header, &me);
        }
        let kind = RemoteOpKind::RemoveSender {
            chan: Arc::clone(header),
            sender: me,
        };
        self.post(&header.host, kind, None)
    }

    /// Prepare a thread, register it as a sender on `header`, then queue it
    pub(crate) fn create_with_channel(
        &self,
        entry: Entry,
        header: &Arc<ChanHeader>,
        flags: LwtFlags,
    ) -> LwtResult<Lwt> {
        let key = self.prepare(entry, flags)?;
        let sender = {
            let st = self.state.borrow();
            self.lwt_handle(&st.sched, key)
        };
        if let Err(e) = self.chan_add_sender(header, sender) {
            self.discard(key);
            return Err(e);
        }
        Ok(self.launch(key))
    }
}

fn downcast_payload<T: Any>(payload: Payload) -> LwtResult<T> {
    payload
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| LwtError::PayloadType)
}

/// Typed channel handle
///
/// Cloning copies the handle only; it does not register a sender.
pub struct Chan<T> {
    pub(crate) header: Arc<ChanHeader>,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Any + Send> Chan<T> {
    /// Open a channel on the calling host with the caller as receiver
    pub fn new(capacity: usize) -> Self {
        Chan::from_header(with_host(|h| h.chan_open(capacity)))
    }

    /// Send `value`, parking while the channel cannot take it
    pub fn send(&self, value: T) -> LwtResult<()> {
        with_host(|h| h.chan_send(&self.header, Box::new(value)))
    }

    /// Take the next value; only the receiver may call this
    pub fn receive(&self) -> LwtResult<T> {
        with_host(|h| h.chan_receive(&self.header)).and_then(downcast_payload)
    }

    /// Register the calling thread as a sender
    pub fn register_sender(&self) -> LwtResult<()> {
        with_host(|h| {
            let me = h.current();
            h.chan_add_sender(&self.header, me)
        })
    }

    /// Give up the caller's hold on the channel
    ///
    /// The receiver closes the channel for further sends; a sender drops one
    /// registration. The channel is freed once nobody holds it.
    pub fn deref(self) -> LwtResult<()> {
        with_host(|h| h.chan_release(&self.header))
    }
}

impl<T> Chan<T> {
    pub(crate) fn from_header(header: Arc<ChanHeader>) -> Self {
        Chan {
            header,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn id(&self) -> ChanId {
        self.header.id
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.header.capacity
    }

    #[inline]
    pub fn host_id(&self) -> HostId {
        self.header.host.id
    }

    pub fn mark_set(&self, mark: usize) {
        self.header.mark.store(mark, Ordering::Release);
    }

    pub fn mark_get(&self) -> usize {
        self.header.mark.load(Ordering::Acquire)
    }

    /// Type-erased handle, as returned by a group wait
    pub fn untyped(&self) -> ChanRef {
        ChanRef {
            header: Arc::clone(&self.header),
        }
    }
}

impl<U: Any + Send> Chan<Chan<U>> {
    /// Send a channel handle
    pub fn send_chan(&self, chan: &Chan<U>) -> LwtResult<()> {
        self.send(chan.clone())
    }

    /// Receive a channel handle and register the caller as its sender
    pub fn receive_chan(&self) -> LwtResult<Chan<U>> {
        let chan = self.receive()?;
        chan.register_sender()?;
        Ok(chan)
    }
}

impl<T> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Chan::from_header(Arc::clone(&self.header))
    }
}

impl<T> PartialEq for Chan<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.header, &other.header)
    }
}

impl<T> Eq for Chan<T> {}

impl<T> fmt::Debug for Chan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chan({:?})", self.header)
    }
}

/// Type-erased channel handle
#[derive(Clone)]
pub struct ChanRef {
    pub(crate) header: Arc<ChanHeader>,
}

impl ChanRef {
    #[inline]
    pub fn id(&self) -> ChanId {
        self.header.id
    }

    pub fn mark(&self) -> usize {
        self.header.mark.load(Ordering::Acquire)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.header.capacity
    }

    /// Check if this is the channel behind `chan`
    pub fn is<T>(&self, chan: &Chan<T>) -> bool {
        Arc::ptr_eq(&self.header, &chan.header)
    }

    /// Receive a `T`; a payload of another type is consumed and reported
    /// as `PayloadType`
    pub fn receive<T: Any + Send>(&self) -> LwtResult<T> {
        with_host(|h| h.chan_receive(&self.header)).and_then(downcast_payload)
    }
}

impl fmt::Debug for ChanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChanRef({:?})", self.header)
    }
}

/// Open a channel on the calling host
pub fn chan<T: Any + Send>(capacity: usize) -> Chan<T> {
    Chan::new(capacity)
}

/// Create a thread registered as a sender on `chan` before it first runs
///
/// The closure gets its own handle to the channel.
pub fn create_with_channel<T, F, R>(f: F, chan: &Chan<T>, flags: LwtFlags) -> LwtResult<Lwt>
where
    T: Any + Send,
    F: FnOnce(Chan<T>) -> R + 'static,
    R: Any + Send,
{
    let handle = chan.clone();
    let entry: Entry = Box::new(move || Box::new(f(handle)) as Payload);
    with_host(|h| h.create_with_channel(entry, &chan.header, flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{create, info, join, yield_now};
    use lwt_core::InfoKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_ring_wraps_in_fifo_order() {
        let mut ring = Ring::new(3);
        for round in 0..4u32 {
            for i in 0..3u32 {
                assert!(ring.push(Box::new(round * 10 + i)).is_ok());
            }
            assert!(ring.push(Box::new(99u32)).is_err());
            for i in 0..3u32 {
                let p = ring.pop().unwrap();
                assert_eq!(*p.downcast::<u32>().unwrap(), round * 10 + i);
            }
            assert!(ring.pop().is_none());
            // Leave the head somewhere new each round
            ring.push(Box::new(0u32)).unwrap();
            ring.pop().unwrap();
        }
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn test_zero_capacity_ring_never_has_room() {
        let mut ring = Ring::new(0);
        assert!(!ring.has_room());
        assert!(ring.push(Box::new(1u8)).is_err());
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_rendezvous() {
        let c = Chan::<u32>::new(0);
        let t = create_with_channel(
            |c| {
                for i in 0..5 {
                    c.send(i).unwrap();
                }
            },
            &c,
            LwtFlags::JOINABLE,
        )
        .unwrap();
        let got: Vec<u32> = (0..5).map(|_| c.receive().unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        join::<()>(&t).unwrap();
    }

    #[test]
    fn test_sync_send_waits_for_receiver() {
        let c = Chan::<u8>::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let t = create_with_channel(
            move |c| {
                c.send(1).unwrap();
                l.borrow_mut().push("sent");
            },
            &c,
            LwtFlags::JOINABLE,
        )
        .unwrap();
        yield_now();
        assert!(log.borrow().is_empty());
        assert_eq!(info(LwtStatus::Sending), 1);

        assert_eq!(c.receive().unwrap(), 1);
        join::<()>(&t).unwrap();
        assert_eq!(*log.borrow(), vec!["sent"]);
    }

    #[test]
    fn test_async_buffers_up_to_capacity() {
        let c = Chan::<usize>::new(3);
        let sent = Rc::new(RefCell::new(0usize));
        let s = Rc::clone(&sent);
        let t = create_with_channel(
            move |c| {
                for i in 0..5 {
                    c.send(i).unwrap();
                    *s.borrow_mut() += 1;
                }
            },
            &c,
            LwtFlags::JOINABLE,
        )
        .unwrap();
        yield_now();
        // Three buffered, the fourth parked
        assert_eq!(*sent.borrow(), 3);
        assert_eq!(info(LwtStatus::Sending), 1);

        let got: Vec<usize> = (0..5).map(|_| c.receive().unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        join::<()>(&t).unwrap();
    }

    #[test]
    fn test_no_senders() {
        let c = Chan::<i32>::new(0);
        assert_eq!(c.receive(), Err(LwtError::NoSenders));

        let t = create_with_channel(|c| c.deref(), &c, LwtFlags::JOINABLE).unwrap();
        assert_eq!(c.receive(), Err(LwtError::NoSenders));
        assert_eq!(join::<LwtResult<()>>(&t).unwrap(), Ok(()));
    }

    #[test]
    fn test_only_receiver_receives() {
        let c = Chan::<i32>::new(2);
        let t = create_with_channel(|c| c.receive().unwrap_err(), &c, LwtFlags::JOINABLE).unwrap();
        assert_eq!(join::<LwtError>(&t).unwrap(), LwtError::NotReceiver);
    }

    #[test]
    fn test_receiver_deref_fails_parked_senders() {
        let c = Chan::<u8>::new(0);
        let t = create_with_channel(|c| c.send(9), &c, LwtFlags::JOINABLE).unwrap();
        yield_now();
        assert_eq!(info(InfoKind::Channels), 1);
        c.clone().deref().unwrap();
        assert_eq!(info(InfoKind::Channels), 0);
        assert_eq!(join::<LwtResult<()>>(&t).unwrap(), Err(LwtError::NoReceiver));
    }

    #[test]
    fn test_deref_by_stranger_and_stale_use() {
        let c = Chan::<u8>::new(1);
        let t = create(
            {
                let c = c.clone();
                move || c.deref()
            },
            LwtFlags::JOINABLE,
        )
        .unwrap();
        assert_eq!(join::<LwtResult<()>>(&t).unwrap(), Err(LwtError::NotHolder));

        c.clone().deref().unwrap();
        // No receiver and no senders: the channel is gone
        assert_eq!(c.send(1), Err(LwtError::StaleChannel));
        assert_eq!(c.clone().deref(), Err(LwtError::StaleChannel));
    }

    #[test]
    fn test_send_and_receive_channels() {
        let control = Chan::<Chan<u64>>::new(0);
        let t = create_with_channel(
            |control| {
                let reply = Chan::<u64>::new(0);
                control.send_chan(&reply).unwrap();
                reply.receive().unwrap()
            },
            &control,
            LwtFlags::JOINABLE,
        )
        .unwrap();
        let reply = control.receive_chan().unwrap();
        reply.send(77).unwrap();
        assert_eq!(join::<u64>(&t).unwrap(), 77);
    }

    #[test]
    fn test_marks_and_identity() {
        let a = Chan::<()>::new(0);
        let b = Chan::<()>::new(0);
        assert_eq!(a.mark_get(), 0);
        a.mark_set(7);
        assert_eq!(a.untyped().mark(), 7);
        assert!(a.untyped().is(&a));
        assert!(!a.untyped().is(&b));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_untyped_receive_type_mismatch() {
        let c = Chan::<u16>::new(1);
        let t = create_with_channel(|c| c.send(5), &c, LwtFlags::JOINABLE).unwrap();
        join::<LwtResult<()>>(&t).unwrap().unwrap();
        assert_eq!(c.untyped().receive::<String>(), Err(LwtError::PayloadType));
    }
}
