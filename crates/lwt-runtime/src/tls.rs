//! Thread-local storage for the host
//!
//! Every OS thread that touches the runtime owns exactly one [`Host`],
//! bootstrapped on first use and dropped when the OS thread exits.

use std::cell::OnceCell;

use crate::host::Host;

thread_local! {
    static HOST: OnceCell<Host> = const { OnceCell::new() };
}

/// Run `f` against this OS thread's host, bootstrapping it if needed
#[inline]
pub(crate) fn with_host<R>(f: impl FnOnce(&Host) -> R) -> R {
    HOST.with(|cell| f(cell.get_or_init(Host::bootstrap)))
}

/// Check if this OS thread has bootstrapped a host yet
#[inline]
pub fn has_host() -> bool {
    HOST.try_with(|cell| cell.get().is_some()).unwrap_or(false)
}
