//! Library defaults for [`RuntimeConfig`](super::RuntimeConfig)

/// Usable stack bytes per thread (guard page not included)
pub const STACK_SIZE: usize = 256 * 1024;

/// Control blocks (with stacks) preallocated into each host's ready pool
pub const POOL_SIZE: usize = 16;

/// Upper bound on control blocks per host; `create` yields past this
pub const MAX_LWTS: usize = 8192;

/// Slots in each host's inbound remote-operation queue
pub const REMOTE_QUEUE_CAPACITY: usize = 256;

/// Emit debug-level scheduler logging
pub const DEBUG_LOGGING: bool = false;

/// Name prefix for OS threads started by `kthd_create`
pub const HOST_THREAD_PREFIX: &str = "lwt-host";
