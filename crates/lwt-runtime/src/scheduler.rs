//! Thread lifecycle and the per-host scheduler
//!
//! A host runs one LWT at a time and only switches at explicit scheduling
//! points: `yield`, `block`, `join`, `die`, and the blocking paths of
//! channels and groups. The run queue is FIFO, `signal` inserts at the
//! head, and when nothing is runnable the host switches to its reaper.
//!
//! Host state lives in a `RefCell`. Every operation here takes the borrow,
//! computes what to do, and releases it before the context switch.

use std::any::Any;
use std::cell::RefMut;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lwt_core::{
    kprint, ktrace, HostId, InfoKind, LwtError, LwtFlags, LwtId, LwtResult, LwtStatus, Slab,
    SlotKey,
};

use crate::arch::{self, Context, EntryFn};
use crate::host::{fatal, Host, HostShared, HostState};
use crate::remote::Payload;
use crate::stack::Stack;
use crate::tls::with_host;

/// Start closure of a thread, already boxed to return a payload
pub(crate) type Entry = Box<dyn FnOnce() -> Payload>;

/// Handle to a lightweight thread
///
/// Cheap to clone and `Send`; the thread itself stays on its host. A
/// handle goes stale once the thread is recycled.
#[derive(Clone)]
pub struct Lwt {
    pub(crate) host: Arc<HostShared>,
    pub(crate) key: SlotKey,
    id: LwtId,
}

impl Lwt {
    /// Process-unique id
    #[inline]
    pub fn id(&self) -> LwtId {
        self.id
    }

    /// Id of the host this thread lives on
    #[inline]
    pub fn host_id(&self) -> HostId {
        self.host.id
    }

    /// Check if this handle names the calling thread
    pub fn is_current(&self) -> bool {
        with_host(|h| h.is_local(&self.host) && h.state.borrow().sched.current == self.key)
    }
}

impl PartialEq for Lwt {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.host, &other.host) && self.key == other.key
    }
}

impl Eq for Lwt {}

impl fmt::Debug for Lwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lwt({}@{})", self.id, self.host.id)
    }
}

impl fmt::Display for Lwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// What a Blocked thread is parked on, so that an exit only wakes the
/// thread it concerns and a plain `block` stays parked until signalled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Waiting {
    #[default]
    Nothing,
    /// `join` on this child
    Join(SlotKey),
    /// `die` waiting for its own children
    Children,
    /// Host shutdown waiting for every created thread
    Drain,
}

/// Control block
pub(crate) struct LwtCb {
    pub(crate) id: LwtId,
    pub(crate) status: LwtStatus,
    pub(crate) flags: LwtFlags,
    pub(crate) parent: Option<SlotKey>,
    pub(crate) children: Vec<SlotKey>,
    pub(crate) waiting: Waiting,
    pub(crate) context: Box<Context>,
    /// `None` only for the bootstrap thread, which runs on the OS stack
    pub(crate) stack: Option<Stack>,
    pub(crate) entry: Option<Entry>,
    pub(crate) retval: Option<Payload>,
}

impl LwtCb {
    /// The OS thread's own context, adopted as a Runnable LWT
    pub(crate) fn bootstrap() -> Self {
        Self {
            id: LwtId::next(),
            status: LwtStatus::Runnable,
            flags: LwtFlags::JOINABLE,
            parent: None,
            children: Vec::new(),
            waiting: Waiting::Nothing,
            context: Box::default(),
            stack: None,
            entry: None,
            retval: None,
        }
    }

    /// A fresh ready-pool block owning `stack`
    pub(crate) fn pooled(stack: Stack) -> Self {
        Self {
            id: LwtId::NONE,
            status: LwtStatus::ReadyPool,
            flags: LwtFlags::JOINABLE,
            parent: None,
            children: Vec::new(),
            waiting: Waiting::Nothing,
            context: Box::default(),
            stack: Some(stack),
            entry: None,
            retval: None,
        }
    }

    pub(crate) fn prime(&mut self, entry: EntryFn) {
        if let Some(stack) = &self.stack {
            arch::init_context(&mut self.context, stack.initial_sp(), entry);
        }
    }

    /// Forget the previous incarnation before going back to the pool
    fn scrub(&mut self) -> Option<Payload> {
        self.status = LwtStatus::ReadyPool;
        self.parent = None;
        self.children.clear();
        self.waiting = Waiting::Nothing;
        self.entry = None;
        self.retval.take()
    }
}

/// Run queue, ready pool and the thread arena of one host
pub(crate) struct Sched {
    pub(crate) lwts: Slab<LwtCb>,
    pub(crate) run_queue: VecDeque<SlotKey>,
    /// LIFO, so a freshly recycled stack is reused while still warm
    pub(crate) ready_pool: Vec<SlotKey>,
    pub(crate) current: SlotKey,
    pub(crate) bootstrap: SlotKey,
    pub(crate) reaper: SlotKey,
    /// Created threads that have not died yet
    pub(crate) live: usize,
}

impl Sched {
    pub(crate) fn new(lwts: Slab<LwtCb>, bootstrap: SlotKey, reaper: SlotKey) -> Self {
        Self {
            lwts,
            run_queue: VecDeque::new(),
            ready_pool: Vec::new(),
            current: bootstrap,
            bootstrap,
            reaper,
            live: 0,
        }
    }

    #[inline]
    pub(crate) fn status(&self, key: SlotKey) -> Option<LwtStatus> {
        self.lwts.get(key).map(|cb| cb.status)
    }

    #[inline]
    pub(crate) fn set_current_status(&mut self, status: LwtStatus) {
        let cur = self.current;
        if let Some(cb) = self.lwts.get_mut(cur) {
            cb.status = status;
        }
    }

    pub(crate) fn id_of(&self, key: SlotKey) -> LwtId {
        self.lwts.get(key).map_or(LwtId::NONE, |cb| cb.id)
    }

    /// Make a parked thread runnable at the head of the run queue.
    /// Anything else (stale, runnable, zombie, pooled, the reaper) is ignored.
    pub(crate) fn wake(&mut self, key: SlotKey) -> bool {
        if key == self.reaper {
            return false;
        }
        match self.lwts.get_mut(key) {
            Some(cb) if cb.status.is_parked() => {
                cb.status = LwtStatus::Runnable;
                self.run_queue.push_front(key);
                true
            }
            _ => false,
        }
    }

    /// `wake`, but only out of one particular parked status
    pub(crate) fn wake_if(&mut self, key: SlotKey, status: LwtStatus) -> bool {
        self.status(key) == Some(status) && self.wake(key)
    }

    /// Pull a runnable thread out of the run queue for a direct handoff
    fn unqueue(&mut self, key: SlotKey) -> bool {
        match self.run_queue.iter().position(|k| *k == key) {
            Some(pos) => {
                self.run_queue.remove(pos);
                true
            }
            None => false,
        }
    }

    fn count(&self, status: LwtStatus) -> usize {
        self.lwts
            .iter()
            .filter(|(key, cb)| {
                cb.status == status && (*key != self.reaper || status == LwtStatus::ReaperReady)
            })
            .count()
    }
}

impl Host {
    #[inline]
    pub(crate) fn is_local(&self, host: &Arc<HostShared>) -> bool {
        Arc::ptr_eq(host, &self.shared)
    }

    pub(crate) fn lwt_handle(&self, sched: &Sched, key: SlotKey) -> Lwt {
        Lwt {
            host: Arc::clone(&self.shared),
            key,
            id: sched.id_of(key),
        }
    }

    pub(crate) fn current(&self) -> Lwt {
        let st = self.state.borrow();
        self.lwt_handle(&st.sched, st.sched.current)
    }

    pub(crate) fn live(&self) -> usize {
        self.state.borrow().sched.live
    }

    /// Release the borrow and switch from the current thread to `next`.
    /// Returns when something switches back.
    fn switch_to(&self, mut st: RefMut<'_, HostState>, next: SlotKey) {
        let sched = &mut st.sched;
        let cur = sched.current;
        if cur == next {
            return;
        }
        let from: *mut Context = match sched.lwts.get_mut(cur) {
            Some(cb) => &mut *cb.context,
            None => fatal("current thread has no control block"),
        };
        let (to, next_id): (*const Context, LwtId) = match sched.lwts.get(next) {
            Some(cb) => (&*cb.context, cb.id),
            None => fatal("switch target has no control block"),
        };
        ktrace!("switch {} -> {}", sched.id_of(cur), next_id);
        sched.current = next;
        drop(st);

        kprint::set_context(self.shared.id.as_u32(), next_id.as_u32());
        // SAFETY: both contexts are boxed inside live control blocks whose
        // stacks stay mapped for the life of the host, and the RefCell
        // borrow was released above.
        unsafe { arch::switch(from, to) };
    }

    /// Pick the next thread to run and switch to it
    pub(crate) fn schedule(&self) {
        let mut st = self.state.borrow_mut();
        let sched = &mut st.sched;
        let cur = sched.current;
        let cur_runnable = sched.status(cur) == Some(LwtStatus::Runnable);

        let next = loop {
            match sched.run_queue.pop_front() {
                Some(key) if key == cur => continue,
                Some(key) if sched.status(key) == Some(LwtStatus::Runnable) => break Some(key),
                Some(_) => continue,
                None => break None,
            }
        };

        let next = match next {
            Some(key) => {
                if cur_runnable {
                    sched.run_queue.push_back(cur);
                }
                key
            }
            None if cur_runnable || cur == sched.reaper => return,
            None => sched.reaper,
        };
        self.switch_to(st, next);
    }

    /// Park the current thread with `status` and run something else
    pub(crate) fn park_current(&self, status: LwtStatus) {
        self.state.borrow_mut().sched.set_current_status(status);
        self.schedule();
    }

    /// Park the current thread as Blocked on `waiting`
    fn park_waiting(&self, waiting: Waiting) {
        {
            let mut st = self.state.borrow_mut();
            let cur = st.sched.current;
            if let Some(cb) = st.sched.lwts.get_mut(cur) {
                cb.waiting = waiting;
            }
        }
        self.park_current(LwtStatus::Blocked);
        let mut st = self.state.borrow_mut();
        let cur = st.sched.current;
        if let Some(cb) = st.sched.lwts.get_mut(cur) {
            cb.waiting = Waiting::Nothing;
        }
    }

    /// Park until every thread created on this host has died
    pub(crate) fn wait_drained(&self) {
        while self.live() > 0 {
            self.park_waiting(Waiting::Drain);
        }
    }

    /// Park the current thread and run `target` next if it is runnable
    pub(crate) fn park_and_handoff(&self, status: LwtStatus, target: SlotKey) {
        let mut st = self.state.borrow_mut();
        st.sched.set_current_status(status);
        let direct = target != st.sched.current
            && st.sched.status(target) == Some(LwtStatus::Runnable)
            && st.sched.unqueue(target);
        if direct {
            self.switch_to(st, target);
        } else {
            drop(st);
            self.schedule();
        }
    }

    pub(crate) fn block(&self, reason: LwtStatus) -> LwtResult<()> {
        if !reason.is_block_reason() {
            return Err(LwtError::InvalidStatus);
        }
        self.park_current(reason);
        Ok(())
    }

    pub(crate) fn signal(&self, t: &Lwt) {
        if self.is_local(&t.host) {
            self.state.borrow_mut().sched.wake(t.key);
        } else if let Err(e) = self.post(&t.host, crate::remote::RemoteOpKind::Signal(t.clone()), None)
        {
            lwt_core::kdebug!("signal {} on {} dropped: {}", t.id, t.host.id, e);
        }
    }

    pub(crate) fn yield_now(&self) {
        self.schedule();
    }

    pub(crate) fn yield_to(&self, t: &Lwt) -> LwtResult<()> {
        if !self.is_local(&t.host) {
            return Err(LwtError::ForeignThread);
        }
        let mut st = self.state.borrow_mut();
        let sched = &mut st.sched;
        if t.key == sched.current {
            return Err(LwtError::YieldToSelf);
        }
        match sched.status(t.key) {
            None => return Err(LwtError::StaleThread),
            Some(LwtStatus::Runnable) => {}
            Some(_) => return Err(LwtError::NotRunnable),
        }
        if !sched.unqueue(t.key) {
            return Err(LwtError::NotRunnable);
        }
        let cur = sched.current;
        if sched.status(cur) == Some(LwtStatus::Runnable) {
            sched.run_queue.push_front(cur);
        }
        self.switch_to(st, t.key);
        Ok(())
    }

    /// Take a control block off the ready pool and set it up to run
    /// `entry`, without queueing it yet
    pub(crate) fn prepare(&self, entry: Entry, flags: LwtFlags) -> LwtResult<SlotKey> {
        let mut entry = Some(entry);
        loop {
            {
                let mut st = self.state.borrow_mut();
                let sched = &mut st.sched;
                let key = match sched.ready_pool.pop() {
                    Some(key) => Some(key),
                    None if sched.lwts.len() < self.config.max_lwts => {
                        let stack = self.stacks.allocate()?;
                        Some(sched.lwts.insert(LwtCb::pooled(stack)))
                    }
                    None => None,
                };

                if let Some(key) = key {
                    let parent = sched.current;
                    let Some(cb) = sched.lwts.get_mut(key) else {
                        fatal("ready pool holds a stale key");
                    };
                    cb.id = LwtId::next();
                    cb.flags = flags;
                    cb.parent = Some(parent);
                    cb.children.clear();
                    cb.entry = entry.take();
                    cb.retval = None;
                    cb.prime(lwt_entry);
                    if let Some(p) = sched.lwts.get_mut(parent) {
                        p.children.push(key);
                    }
                    return Ok(key);
                }
            }
            ktrace!("ready pool exhausted at {} threads, yielding", self.config.max_lwts);
            self.drain_inbox();
            self.yield_now();
        }
    }

    /// Queue a prepared thread
    pub(crate) fn launch(&self, key: SlotKey) -> Lwt {
        let mut st = self.state.borrow_mut();
        let sched = &mut st.sched;
        if let Some(cb) = sched.lwts.get_mut(key) {
            cb.status = LwtStatus::Runnable;
        }
        sched.run_queue.push_back(key);
        sched.live += 1;
        self.lwt_handle(sched, key)
    }

    /// Undo `prepare` for a thread that will never run
    pub(crate) fn discard(&self, key: SlotKey) {
        let mut st = self.state.borrow_mut();
        let sched = &mut st.sched;
        let parent = sched.lwts.get_mut(key).and_then(|cb| {
            let parent = cb.parent;
            cb.scrub();
            parent
        });
        if let Some(p) = parent.and_then(|p| sched.lwts.get_mut(p)) {
            p.children.retain(|k| *k != key);
        }
        if let Some(fresh) = sched.lwts.rekey(key) {
            sched.ready_pool.push(fresh);
        }
    }

    pub(crate) fn create(&self, entry: Entry, flags: LwtFlags) -> LwtResult<Lwt> {
        let key = self.prepare(entry, flags)?;
        Ok(self.launch(key))
    }

    pub(crate) fn join(&self, t: &Lwt) -> LwtResult<Payload> {
        if !self.is_local(&t.host) {
            return Err(LwtError::ForeignThread);
        }
        {
            let st = self.state.borrow();
            let sched = &st.sched;
            if t.key == sched.current {
                return Err(LwtError::JoinSelf);
            }
            if t.key == sched.bootstrap {
                return Err(LwtError::JoinBootstrap);
            }
            let cb = sched.lwts.get(t.key).ok_or(LwtError::StaleThread)?;
            if cb.parent != Some(sched.current) {
                return Err(LwtError::NotAChild);
            }
            if !cb.flags.is_joinable() {
                return Err(LwtError::NotJoinable);
            }
        }

        loop {
            {
                let mut st = self.state.borrow_mut();
                let sched = &mut st.sched;
                let cb = sched.lwts.get_mut(t.key).ok_or(LwtError::StaleThread)?;
                if cb.status == LwtStatus::Zombie {
                    let value = cb.scrub();
                    if let Some(fresh) = sched.lwts.rekey(t.key) {
                        sched.ready_pool.push(fresh);
                    }
                    let value: Payload = value.unwrap_or_else(|| Box::new(()));
                    return Ok(value);
                }
            }
            self.park_waiting(Waiting::Join(t.key));
        }
    }

    pub(crate) fn die(&self, value: Payload) -> ! {
        {
            let mut st = self.state.borrow_mut();
            let sched = &mut st.sched;
            let cur = sched.current;
            if cur == sched.bootstrap {
                drop(st);
                panic!("the bootstrap thread cannot die");
            }
            if let Some(cb) = sched.lwts.get_mut(cur) {
                cb.retval = Some(value);
            }
        }

        // Children must finish first
        loop {
            let waiting = {
                let st = self.state.borrow();
                st.sched
                    .lwts
                    .get(st.sched.current)
                    .is_some_and(|cb| !cb.children.is_empty())
            };
            if !waiting {
                break;
            }
            self.park_waiting(Waiting::Children);
        }

        let dropped = {
            let mut st = self.state.borrow_mut();
            let sched = &mut st.sched;
            let cur = sched.current;
            let (parent, joinable, id) = match sched.lwts.get(cur) {
                Some(cb) => (cb.parent, cb.flags.is_joinable(), cb.id),
                None => fatal("dying thread has no control block"),
            };

            if let Some(p) = parent {
                let concerned = sched.lwts.get_mut(p).is_some_and(|pcb| {
                    pcb.children.retain(|k| *k != cur);
                    match pcb.waiting {
                        Waiting::Join(k) => k == cur,
                        Waiting::Children => pcb.children.is_empty(),
                        Waiting::Nothing | Waiting::Drain => false,
                    }
                });
                if concerned {
                    sched.wake_if(p, LwtStatus::Blocked);
                }
            }

            let dropped = if joinable {
                if let Some(cb) = sched.lwts.get_mut(cur) {
                    cb.status = LwtStatus::Zombie;
                }
                None
            } else {
                let value = sched.lwts.get_mut(cur).and_then(LwtCb::scrub);
                // Old handles go stale; the stack we are standing on stays
                // with the block and is reused by the next `create`.
                if let Some(fresh) = sched.lwts.rekey(cur) {
                    sched.current = fresh;
                    sched.ready_pool.push(fresh);
                }
                value
            };

            sched.live = sched.live.saturating_sub(1);
            let boot = sched.bootstrap;
            let draining = sched
                .lwts
                .get(boot)
                .is_some_and(|cb| cb.waiting == Waiting::Drain);
            if sched.live == 0 && draining {
                sched.wake_if(boot, LwtStatus::Blocked);
            }
            ktrace!("{} died ({} live)", id, sched.live);
            dropped
        };
        drop(dropped);

        self.schedule();
        fatal("dead thread resumed");
    }

    pub(crate) fn info(&self, kind: InfoKind) -> usize {
        let st = self.state.borrow();
        match kind {
            InfoKind::Status(status) => st.sched.count(status),
            InfoKind::Channels => st.chans.values().filter(|c| c.receiver.is_some()).count(),
        }
    }

    fn take_entry(&self) -> Option<Entry> {
        let mut st = self.state.borrow_mut();
        let cur = st.sched.current;
        st.sched.lwts.get_mut(cur)?.entry.take()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}

/// First code every LWT runs
pub(crate) extern "C" fn lwt_entry() -> ! {
    let value = match with_host(Host::take_entry) {
        Some(entry) => match panic::catch_unwind(AssertUnwindSafe(entry)) {
            Ok(value) => value,
            Err(payload) => {
                lwt_core::kerror!("thread panicked: {}", panic_message(&*payload));
                std::process::abort();
            }
        },
        None => fatal("thread started without an entry"),
    };
    with_host(|h| h.die(value))
}

pub(crate) extern "C" fn reaper_entry() -> ! {
    with_host(|h| h.reap())
}

// ============================================================================
// Public API
// ============================================================================

/// Create a thread on the calling host running `f`
///
/// Blocks (yielding) while the host is at `max_lwts` threads.
pub fn create<F, R>(f: F, flags: LwtFlags) -> LwtResult<Lwt>
where
    F: FnOnce() -> R + 'static,
    R: Any + Send,
{
    with_host(|h| h.create(Box::new(move || Box::new(f()) as Payload), flags))
}

/// Wait for a joinable child to finish and take its return value
pub fn join<R: Any + Send>(t: &Lwt) -> LwtResult<R> {
    let value = with_host(|h| h.join(t))?;
    value
        .downcast::<R>()
        .map(|b| *b)
        .map_err(|_| LwtError::PayloadType)
}

/// Finish the calling thread with `value`
///
/// Waits for the thread's children first. Locals still on the thread's
/// stack are not dropped; returning from the start closure is the usual
/// way out. Panics on the bootstrap thread.
pub fn die<R: Any + Send>(value: R) -> ! {
    with_host(|h| h.die(Box::new(value)))
}

pub fn yield_now() {
    with_host(Host::yield_now)
}

/// Hand the host directly to a runnable thread
pub fn yield_to(t: &Lwt) -> LwtResult<()> {
    with_host(|h| h.yield_to(t))
}

pub fn current() -> Lwt {
    with_host(Host::current)
}

/// Park the calling thread until someone signals it
pub fn block(reason: LwtStatus) -> LwtResult<()> {
    with_host(|h| h.block(reason))
}

/// Make a parked thread runnable; works across hosts
pub fn signal(t: &Lwt) {
    with_host(|h| h.signal(t))
}

/// Count threads or channels on the calling host
pub fn info(kind: impl Into<InfoKind>) -> usize {
    let kind = kind.into();
    with_host(|h| h.info(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_create_and_join_returns_value() {
        let t = create(|| 6 * 7, LwtFlags::JOINABLE).unwrap();
        assert_eq!(join::<i32>(&t).unwrap(), 42);
        assert_eq!(info(LwtStatus::Runnable), 1);
        assert_eq!(info(LwtStatus::Zombie), 0);
    }

    #[test]
    fn test_join_wrong_type() {
        let t = create(|| "text", LwtFlags::JOINABLE).unwrap();
        assert_eq!(join::<u64>(&t), Err(LwtError::PayloadType));
        // The thread was still recycled
        assert_eq!(join::<&str>(&t), Err(LwtError::StaleThread));
    }

    #[test]
    fn test_join_errors() {
        let me = current();
        assert_eq!(join::<()>(&me), Err(LwtError::JoinSelf));

        let t = create(|| (), LwtFlags::NOJOIN).unwrap();
        assert_eq!(join::<()>(&t), Err(LwtError::NotJoinable));
        yield_now();
        assert_eq!(join::<()>(&t), Err(LwtError::StaleThread));
    }

    #[test]
    fn test_join_bootstrap_and_not_child() {
        let boot = current();
        let child = create(
            move || {
                let bootstrap_err = join::<()>(&boot).unwrap_err();
                let sibling = create(|| (), LwtFlags::JOINABLE).unwrap();
                let _ = join::<()>(&sibling);
                bootstrap_err
            },
            LwtFlags::JOINABLE,
        )
        .unwrap();
        assert_eq!(join::<LwtError>(&child).unwrap(), LwtError::JoinBootstrap);

        let other = create(|| (), LwtFlags::JOINABLE).unwrap();
        let prober = create(move || join::<()>(&other).unwrap_err(), LwtFlags::JOINABLE).unwrap();
        assert_eq!(join::<LwtError>(&prober).unwrap(), LwtError::NotAChild);
    }

    #[test]
    fn test_fifo_order_and_yield() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut kids = Vec::new();
        for i in 0..3 {
            let log = Rc::clone(&log);
            kids.push(
                create(
                    move || {
                        log.borrow_mut().push(i);
                        yield_now();
                        log.borrow_mut().push(i + 10);
                    },
                    LwtFlags::JOINABLE,
                )
                .unwrap(),
            );
        }
        for k in &kids {
            join::<()>(k).unwrap();
        }
        assert_eq!(*log.borrow(), vec![0, 1, 2, 10, 11, 12]);
    }

    #[test]
    fn test_directed_yield() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (Rc::clone(&log), Rc::clone(&log));
        let a = create(move || l1.borrow_mut().push('a'), LwtFlags::JOINABLE).unwrap();
        let b = create(move || l2.borrow_mut().push('b'), LwtFlags::JOINABLE).unwrap();

        yield_to(&b).unwrap();
        assert_eq!(*log.borrow(), vec!['b']);
        assert_eq!(yield_to(&b), Err(LwtError::NotRunnable));
        assert_eq!(yield_to(&current()), Err(LwtError::YieldToSelf));

        join::<()>(&a).unwrap();
        join::<()>(&b).unwrap();
        assert_eq!(*log.borrow(), vec!['b', 'a']);
    }

    #[test]
    fn test_block_and_signal() {
        let boot = current();
        let t = create(
            move || {
                block(LwtStatus::Blocked).unwrap();
                signal(&boot);
                7u8
            },
            LwtFlags::JOINABLE,
        )
        .unwrap();
        yield_now();
        assert_eq!(info(LwtStatus::Blocked), 1);
        signal(&t);
        assert_eq!(join::<u8>(&t).unwrap(), 7);
        assert_eq!(block(LwtStatus::Runnable), Err(LwtError::InvalidStatus));
    }

    #[test]
    fn test_child_exit_does_not_end_block() {
        let woken = Rc::new(RefCell::new(None));
        let seen = Rc::clone(&woken);
        let parent = create(
            move || {
                let me = current();
                let flag = Rc::new(RefCell::new(false));
                let signalled = Rc::clone(&flag);
                create(
                    move || {
                        for _ in 0..3 {
                            yield_now();
                        }
                        *signalled.borrow_mut() = true;
                        signal(&me);
                    },
                    LwtFlags::NOJOIN,
                )
                .unwrap();
                create(|| (), LwtFlags::NOJOIN).unwrap();
                block(LwtStatus::Blocked).unwrap();
                *seen.borrow_mut() = Some(*flag.borrow());
            },
            LwtFlags::JOINABLE,
        )
        .unwrap();
        join::<()>(&parent).unwrap();
        assert_eq!(*woken.borrow(), Some(true));
    }

    #[test]
    fn test_join_while_another_child_runs() {
        let slow = create(
            || {
                for _ in 0..5 {
                    yield_now();
                }
                2u8
            },
            LwtFlags::JOINABLE,
        )
        .unwrap();
        let quick = create(|| 1u8, LwtFlags::JOINABLE).unwrap();
        assert_eq!(join::<u8>(&quick).unwrap(), 1);
        assert_eq!(join::<u8>(&slow).unwrap(), 2);
    }

    #[test]
    fn test_nested_joins() {
        let t = create(
            || {
                let kids: Vec<_> = (1..=4u32)
                    .map(|i| create(move || i * i, LwtFlags::JOINABLE).unwrap())
                    .collect();
                kids.iter().map(|k| join::<u32>(k).unwrap()).sum::<u32>()
            },
            LwtFlags::JOINABLE,
        )
        .unwrap();
        assert_eq!(join::<u32>(&t).unwrap(), 1 + 4 + 9 + 16);
    }

    #[test]
    fn test_die_waits_for_children() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Rc::clone(&log);
        let parent = create(
            move || {
                let inner = Rc::clone(&outer);
                create(
                    move || {
                        yield_now();
                        inner.borrow_mut().push("child");
                    },
                    LwtFlags::NOJOIN,
                )
                .unwrap();
                outer.borrow_mut().push("parent");
                die(5i64)
            },
            LwtFlags::JOINABLE,
        )
        .unwrap();
        assert_eq!(join::<i64>(&parent).unwrap(), 5);
        assert_eq!(*log.borrow(), vec!["parent", "child"]);
    }

    #[test]
    fn test_recycling_reuses_control_blocks() {
        for _ in 0..4 {
            let t = create(|| (), LwtFlags::JOINABLE).unwrap();
            join::<()>(&t).unwrap();
        }
        let pooled = info(LwtStatus::ReadyPool);
        for _ in 0..100 {
            let t = create(|| (), LwtFlags::JOINABLE).unwrap();
            join::<()>(&t).unwrap();
        }
        assert_eq!(info(LwtStatus::ReadyPool), pooled);
        assert_eq!(info(LwtStatus::ReaperReady), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = create(|| current().id(), LwtFlags::JOINABLE).unwrap();
        let b = create(|| current().id(), LwtFlags::JOINABLE).unwrap();
        let (ida, idb) = (a.id(), b.id());
        assert_eq!(join::<LwtId>(&a).unwrap(), ida);
        assert_eq!(join::<LwtId>(&b).unwrap(), idb);
        assert_ne!(ida, idb);
        assert!(current().is_current());
    }
}
