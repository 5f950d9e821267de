//! # lwt-runtime
//!
//! Host scheduler and everything platform-specific for the LWT runtime.
//!
//! This crate provides:
//! - Stack mapping with guard pages (mmap/mprotect)
//! - Context switching (architecture-specific assembly)
//! - The per-OS-thread host: scheduler, ready pool, reaper
//! - Typed channels and channel groups
//! - The remote-operation queue that connects hosts
//! - `kthd_create` to start more hosts

pub mod config;
pub mod stack;
pub mod arch;
pub mod parking;
pub mod tls;
pub mod kthd;

mod remote;
mod host;
mod scheduler;
mod channel;
mod group;

// Re-exports
pub use config::{configure, ConfigError, RuntimeConfig};
pub use scheduler::{block, create, current, die, info, join, signal, yield_now, yield_to, Lwt};
pub use channel::{chan, create_with_channel, Chan, ChanRef};
pub use group::Group;
pub use kthd::kthd_create;
pub use tls::has_host;
