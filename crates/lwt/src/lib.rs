//! # lwt - Lightweight Threads
//!
//! Cooperative user-space threads for Rust, multiplexed N:M onto host OS
//! threads and talking over typed channels.
//!
//! ## Features
//!
//! - **Cooperative**: a host switches threads only at yield, block, join,
//!   die and the blocking channel calls
//! - **Fast Context Switch**: callee-saved registers only, hand-written assembly
//! - **Channels**: rendezvous (capacity 0) or bounded ring; channels can be
//!   sent over channels
//! - **Groups**: wait on many channels at once
//! - **N:M Hosts**: `kthd_create` starts another OS thread with its own
//!   scheduler; cross-host work travels as messages, never as shared locks
//!
//! ## Quick Start
//!
//! ```ignore
//! use lwt::{create_with_channel, join, Chan, LwtFlags};
//!
//! fn main() {
//!     let results = Chan::<u64>::new(0);
//!
//!     let worker = create_with_channel(
//!         |out| {
//!             for i in 0..10 {
//!                 out.send(i * i).unwrap();
//!             }
//!         },
//!         &results,
//!         LwtFlags::JOINABLE,
//!     )
//!     .unwrap();
//!
//!     let total: u64 = (0..10).map(|_| results.receive().unwrap()).sum();
//!     join::<()>(&worker).unwrap();
//!     println!("sum of squares: {}", total);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        create(), join(), Chan::send/receive, Group          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Host (one per OS thread)                    │
//! │     run queue, ready pool, channels, groups, reaper         │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                       ▲
//!          ▼                                       │
//!    ┌───────────────┐   RemoteOp (MPSC)    ┌───────────────┐
//!    │  Host h1      │ ───────────────────▶ │  Host h2      │
//!    │  (bootstrap)  │ ◀─────────────────── │  (kthd)       │
//!    └───────────────┘                      └───────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! - `LWT_STACK_SIZE` - Stack size per thread (e.g. `256K`, `1M`)
//! - `LWT_POOL_SIZE` - Control blocks preallocated per host
//! - `LWT_MAX_LWTS` - Upper bound on control blocks per host
//! - `LWT_REMOTE_QUEUE_CAPACITY` - Slots in each host's remote queue
//! - `LWT_DEBUG=1` - Debug logging
//! - `LWT_LOG_LEVEL` / `LWT_FLUSH_EPRINT` - See `kprint`

// Re-export core types
pub use lwt_core::{
    ChanId,
    HostId,
    InfoKind,
    LwtError,
    LwtFlags,
    LwtId,
    LwtResult,
    LwtStatus,
    MemoryError,
};

// Re-export kprint macros for debug logging
pub use lwt_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use lwt_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use lwt_core::{env_get, env_get_bool, env_get_opt, env_get_size, env_get_str, env_is_set};

// Re-export runtime types and operations
pub use lwt_runtime::{
    RuntimeConfig,
    ConfigError,
    configure,
    Lwt,
    Chan,
    ChanRef,
    Group,
    block,
    chan,
    create,
    create_with_channel,
    current,
    die,
    info,
    join,
    kthd_create,
    signal,
    yield_now,
    yield_to,
};

/// Id of a thread
#[inline]
pub fn id(t: &Lwt) -> LwtId {
    t.id()
}

/// Check that the calling host is idle apart from the caller: exactly one
/// runnable thread, nothing blocked, no unjoined zombies
pub fn is_quiescent() -> bool {
    info(LwtStatus::Runnable) == 1
        && info(LwtStatus::Blocked) == 0
        && info(LwtStatus::Zombie) == 0
}

#[cfg(test)]
mod tests;
