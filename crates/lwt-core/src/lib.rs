//! # lwt-core
//!
//! Core types for the LWT (lightweight thread) runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Stacks, context switching and hosts live in `lwt-runtime`.
//!
//! ## Modules
//!
//! - `id` - Thread, channel and host identifiers
//! - `state` - Thread status, creation flags and `info` query kinds
//! - `slot` - Generational arena used for control blocks, channels and groups
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod slot;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{ChanId, HostId, LwtId};
pub use state::{InfoKind, LwtFlags, LwtStatus};
pub use slot::{Slab, SlotKey};
pub use error::{LwtError, LwtResult, MemoryError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_size, env_get_str, env_is_set};

/// Constants for memory layout
pub mod constants {
    /// Smallest stack the runtime accepts (64 KB)
    pub const MIN_STACK_SIZE: usize = 64 * 1024;

    /// Guard page size assumed when the OS cannot be asked (4 KB)
    pub const FALLBACK_PAGE_SIZE: usize = 4096;

    /// Required stack pointer alignment at function entry on both supported arches
    pub const STACK_ALIGN: usize = 16;
}
