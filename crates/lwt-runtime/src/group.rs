//! Channel groups
//!
//! A group multiplexes receives over several channels of one host. Each
//! member that goes from empty to non-empty queues one event; `wait`
//! returns the oldest event without consuming it, and the event is
//! dropped once a receive drains that channel.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use lwt_core::{kdebug, LwtError, LwtResult, LwtStatus, Slab, SlotKey};

use crate::channel::{Chan, ChanHeader, ChanRef, ChanState};
use crate::host::{Host, HostShared, HostState};
use crate::remote::RemoteOpKind;
use crate::scheduler::{Lwt, Sched};
use crate::tls::with_host;

pub(crate) struct GroupState {
    members: Vec<Arc<ChanHeader>>,
    events: VecDeque<Arc<ChanHeader>>,
    waiter: Option<SlotKey>,
    creator: Lwt,
}

/// Queue `header`'s event if it is grouped and not queued yet
pub(crate) fn raise_event(
    sched: &mut Sched,
    groups: &mut Slab<GroupState>,
    chan: &mut ChanState,
    header: &Arc<ChanHeader>,
) {
    if chan.event_queued {
        return;
    }
    let Some(group) = chan.group.and_then(|g| groups.get_mut(g)) else {
        return;
    };
    chan.event_queued = true;
    group.events.push_back(Arc::clone(header));
    if let Some(waiter) = group.waiter {
        sched.wake_if(waiter, LwtStatus::Receiving);
    }
}

pub(crate) fn clear_event(groups: &mut Slab<GroupState>, chan: &mut ChanState, header: &Arc<ChanHeader>) {
    if !chan.event_queued {
        return;
    }
    chan.event_queued = false;
    if let Some(group) = chan.group.and_then(|g| groups.get_mut(g)) {
        group.events.retain(|h| !Arc::ptr_eq(h, header));
    }
}

/// Forget a member whose receiver went away
pub(crate) fn detach_member(groups: &mut Slab<GroupState>, group: SlotKey, header: &Arc<ChanHeader>) {
    if let Some(group) = groups.get_mut(group) {
        group.members.retain(|h| !Arc::ptr_eq(h, header));
        group.events.retain(|h| !Arc::ptr_eq(h, header));
    }
}

impl Host {
    fn group_open(&self) -> SlotKey {
        let creator = self.current();
        self.state.borrow_mut().groups.insert(GroupState {
            members: Vec::new(),
            events: VecDeque::new(),
            waiter: None,
            creator,
        })
    }

    pub(crate) fn group_add_local(&self, group: &Group, header: &Arc<ChanHeader>) -> LwtResult<()> {
        if !Arc::ptr_eq(&header.host, &group.host) {
            return Err(LwtError::ForeignChannel);
        }
        let mut st = self.state.borrow_mut();
        let HostState {
            sched,
            chans,
            groups,
        } = &mut *st;
        if !groups.contains(group.key) {
            return Err(LwtError::StaleGroup);
        }
        let chan = chans.get_mut(header.key).ok_or(LwtError::StaleChannel)?;
        if chan.group.is_some() {
            return Err(LwtError::AlreadyGrouped);
        }
        chan.group = Some(group.key);
        if let Some(gs) = groups.get_mut(group.key) {
            gs.members.push(Arc::clone(header));
        }
        if chan.has_data() {
            raise_event(sched, groups, chan, header);
        }
        Ok(())
    }

    pub(crate) fn group_remove_local(&self, group: &Group, header: &Arc<ChanHeader>) -> LwtResult<()> {
        // A foreign key would alias an unrelated channel in this host's arena
        if !Arc::ptr_eq(&header.host, &group.host) {
            return Err(LwtError::ForeignChannel);
        }
        let mut st = self.state.borrow_mut();
        let HostState { chans, groups, .. } = &mut *st;
        let gs = groups.get_mut(group.key).ok_or(LwtError::StaleGroup)?;
        let chan = chans.get_mut(header.key).ok_or(LwtError::StaleChannel)?;
        if chan.group != Some(group.key) {
            return Err(LwtError::NotInGroup);
        }
        if !gs.events.is_empty() {
            return Err(LwtError::EventsPending);
        }
        chan.group = None;
        chan.event_queued = false;
        gs.members.retain(|h| !Arc::ptr_eq(h, header));
        Ok(())
    }

    fn group_wait(&self, group: &Group) -> LwtResult<ChanRef> {
        loop {
            {
                let mut st = self.state.borrow_mut();
                let HostState { sched, groups, .. } = &mut *st;
                let cur = sched.current;
                let gs = groups.get_mut(group.key).ok_or(LwtError::StaleGroup)?;
                if gs.waiter.is_some_and(|w| w != cur) {
                    return Err(LwtError::GroupBusy);
                }
                if let Some(head) = gs.events.front() {
                    gs.waiter = None;
                    return Ok(ChanRef {
                        header: Arc::clone(head),
                    });
                }
                gs.waiter = Some(cur);
                sched.set_current_status(LwtStatus::Receiving);
            }
            self.schedule();
        }
    }

    fn group_free(&self, group: &Group) -> LwtResult<()> {
        let mut st = self.state.borrow_mut();
        let HostState { chans, groups, .. } = &mut *st;
        let gs = groups.get(group.key).ok_or(LwtError::StaleGroup)?;
        if !gs.events.is_empty() {
            return Err(LwtError::EventsPending);
        }
        if gs.waiter.is_some() {
            return Err(LwtError::GroupBusy);
        }
        if let Some(gs) = groups.remove(group.key) {
            for member in &gs.members {
                if let Some(chan) = chans.get_mut(member.key) {
                    chan.group = None;
                    chan.event_queued = false;
                }
            }
            kdebug!("group freed ({} members, created by {})", gs.members.len(), gs.creator);
        }
        Ok(())
    }
}

/// Handle to a channel group
///
/// A group lives on the host that created it and only accepts channels
/// of that host. Membership can be changed from any host; `wait` and
/// `free` only from the group's own host.
#[derive(Clone)]
pub struct Group {
    host: Arc<HostShared>,
    key: SlotKey,
}

impl Group {
    pub fn new() -> Self {
        with_host(|h| Group {
            host: Arc::clone(&h.shared),
            key: h.group_open(),
        })
    }

    /// Add a channel; one that already holds data queues its event now
    pub fn add<T>(&self, chan: &Chan<T>) -> LwtResult<()> {
        with_host(|h| {
            if h.is_local(&self.host) {
                return h.group_add_local(self, &chan.header);
            }
            if !Arc::ptr_eq(&chan.header.host, &self.host) {
                return Err(LwtError::ForeignChannel);
            }
            let kind = RemoteOpKind::AddChannelToGroup {
                group: self.clone(),
                chan: Arc::clone(&chan.header),
            };
            h.post_blocking(&self.host, kind).map(|_| ())
        })
    }

    pub fn remove<T>(&self, chan: &Chan<T>) -> LwtResult<()> {
        with_host(|h| {
            if h.is_local(&self.host) {
                return h.group_remove_local(self, &chan.header);
            }
            if !Arc::ptr_eq(&chan.header.host, &self.host) {
                return Err(LwtError::ForeignChannel);
            }
            let kind = RemoteOpKind::RemoveChannelFromGroup {
                group: self.clone(),
                chan: Arc::clone(&chan.header),
            };
            h.post_blocking(&self.host, kind).map(|_| ())
        })
    }

    /// Block until some member has data and return it, without consuming
    /// the event
    pub fn wait(&self) -> LwtResult<ChanRef> {
        with_host(|h| {
            if !h.is_local(&self.host) {
                return Err(LwtError::ForeignGroup);
            }
            h.group_wait(self)
        })
    }

    /// Release the group and detach its members
    pub fn free(self) -> LwtResult<()> {
        with_host(|h| {
            if !h.is_local(&self.host) {
                return Err(LwtError::ForeignGroup);
            }
            h.group_free(&self)
        })
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group({:?}@{})", self.key, self.host.id)
    }
}
