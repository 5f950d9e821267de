//! Host parking
//!
//! When a host has nothing runnable and an empty remote queue, its reaper
//! parks the OS thread here. Producers on other hosts call [`Parker::unpark`]
//! after every push. The mutex/condvar pair guards only the wake flag, never
//! scheduler or channel state.
//!
//! Ordering: the parker publishes `parked` then re-checks for work under the
//! lock; producers publish their op then check `parked`. Both sides use
//! `SeqCst`, so at least one of them sees the other and no wakeup is lost.

use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

pub struct Parker {
    /// bool = wake_pending
    mutex: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl Parker {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }

    /// Block the OS thread until unparked, unless `has_work` already holds.
    pub fn park(&self, has_work: impl Fn() -> bool) {
        self.parked.store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let mut pending = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        while !*pending && !has_work() {
            pending = self
                .condvar
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *pending = false;
        self.parked.store(false, Ordering::SeqCst);
    }

    /// Wake the parked OS thread, if any. Call after publishing work.
    pub fn unpark(&self) {
        fence(Ordering::SeqCst);
        if !self.parked.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut pending = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
            *pending = true;
        }
        self.condvar.notify_one();
    }

    /// Hint only; may be stale by the time the caller looks at it
    #[inline]
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_park_returns_when_work_present() {
        let parker = Parker::new();
        parker.park(|| true);
        assert!(!parker.is_parked());
    }

    #[test]
    fn test_unpark_wakes_parked_thread() {
        let parker = Arc::new(Parker::new());
        let work = Arc::new(AtomicUsize::new(0));

        let (p2, w2) = (Arc::clone(&parker), Arc::clone(&work));
        let handle = thread::spawn(move || {
            p2.park(|| w2.load(Ordering::SeqCst) > 0);
            w2.load(Ordering::SeqCst)
        });

        thread::sleep(Duration::from_millis(20));
        work.store(1, Ordering::SeqCst);
        parker.unpark();

        assert_eq!(handle.join().unwrap(), 1);
    }

    #[test]
    fn test_unpark_before_park_is_not_lost() {
        let parker = Arc::new(Parker::new());
        let work = Arc::new(AtomicUsize::new(0));

        // Many rounds of racing producer vs parker
        for round in 1..=200 {
            let (p2, w2) = (Arc::clone(&parker), Arc::clone(&work));
            let producer = thread::spawn(move || {
                w2.store(round, Ordering::SeqCst);
                p2.unpark();
            });
            parker.park(|| work.load(Ordering::SeqCst) == round);
            producer.join().unwrap();
        }
    }
}
