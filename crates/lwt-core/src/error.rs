//! Error types for the LWT runtime

use core::fmt;

/// Result type for runtime operations
pub type LwtResult<T> = Result<T, LwtError>;

/// Errors returned by thread, channel, group and host operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LwtError {
    /// `join` called on the calling thread
    JoinSelf,

    /// `join` called on the host's bootstrap thread
    JoinBootstrap,

    /// `join` target is not a child of the caller
    NotAChild,

    /// `join` target was created with `LwtFlags::NOJOIN`
    NotJoinable,

    /// `yield_to` the calling thread
    YieldToSelf,

    /// `yield_to` a thread that is not in the run queue
    NotRunnable,

    /// `block` called with a status that is not a block reason
    InvalidStatus,

    /// Thread handle belongs to another host
    ForeignThread,

    /// Thread handle refers to a recycled control block
    StaleThread,

    /// `receive` called by a thread that is not the channel's receiver
    NotReceiver,

    /// `deref` called by a thread holding no reference to the channel
    NotHolder,

    /// Send on a channel whose receiver has released it
    NoReceiver,

    /// Synchronous receive on a channel with no registered senders
    NoSenders,

    /// Channel handle refers to a released channel
    StaleChannel,

    /// Payload did not have the requested type
    PayloadType,

    /// Channel already belongs to a group
    AlreadyGrouped,

    /// Channel does not belong to this group
    NotInGroup,

    /// Group still has undelivered events
    EventsPending,

    /// Another thread is already waiting on this group
    GroupBusy,

    /// Group handle used from a host that does not own it
    ForeignGroup,

    /// Channel and group live on different hosts
    ForeignChannel,

    /// Group handle refers to a freed group
    StaleGroup,

    /// OS thread for a new host could not be spawned
    HostSpawn,

    /// Target host has shut down
    HostGone,

    /// Runtime configuration was set after the first host started
    AlreadyConfigured,

    /// Runtime configuration rejected by validation
    InvalidConfig(&'static str),

    /// Stack mapping failed
    Memory(MemoryError),
}

impl LwtError {
    /// Numeric code for group conflicts, matching the classic C return codes.
    ///
    /// Every other error maps to -1.
    pub fn code(&self) -> i32 {
        match self {
            LwtError::EventsPending => 1,
            _ => -1,
        }
    }

    /// Channel protocol errors are the recoverable class; callers decide what to do.
    pub fn is_protocol(&self) -> bool {
        matches!(self, LwtError::NoReceiver | LwtError::NoSenders)
    }
}

impl fmt::Display for LwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LwtError::JoinSelf => write!(f, "cannot join the calling thread"),
            LwtError::JoinBootstrap => write!(f, "cannot join the bootstrap thread"),
            LwtError::NotAChild => write!(f, "thread is not a child of the caller"),
            LwtError::NotJoinable => write!(f, "thread is not joinable"),
            LwtError::YieldToSelf => write!(f, "cannot yield to the calling thread"),
            LwtError::NotRunnable => write!(f, "yield target is not runnable"),
            LwtError::InvalidStatus => write!(f, "status is not a valid block reason"),
            LwtError::ForeignThread => write!(f, "thread belongs to another host"),
            LwtError::StaleThread => write!(f, "thread handle is stale"),
            LwtError::NotReceiver => write!(f, "caller is not the channel receiver"),
            LwtError::NotHolder => write!(f, "caller holds no reference to the channel"),
            LwtError::NoReceiver => write!(f, "channel has no receiver"),
            LwtError::NoSenders => write!(f, "channel has no senders"),
            LwtError::StaleChannel => write!(f, "channel has been released"),
            LwtError::PayloadType => write!(f, "payload type mismatch"),
            LwtError::AlreadyGrouped => write!(f, "channel already belongs to a group"),
            LwtError::NotInGroup => write!(f, "channel is not in this group"),
            LwtError::EventsPending => write!(f, "group has pending events"),
            LwtError::GroupBusy => write!(f, "another thread is waiting on the group"),
            LwtError::ForeignGroup => write!(f, "group belongs to another host"),
            LwtError::ForeignChannel => write!(f, "channel and group live on different hosts"),
            LwtError::StaleGroup => write!(f, "group has been freed"),
            LwtError::HostSpawn => write!(f, "failed to spawn host thread"),
            LwtError::HostGone => write!(f, "host has shut down"),
            LwtError::AlreadyConfigured => write!(f, "runtime already configured"),
            LwtError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            LwtError::Memory(e) => write!(f, "memory error: {}", e),
        }
    }
}

impl std::error::Error for LwtError {}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect on the guard page failed
    ProtectionFailed,

    /// Requested stack size overflows the address space
    TooLarge,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "guard page protection failed"),
            MemoryError::TooLarge => write!(f, "stack size too large"),
        }
    }
}

impl From<MemoryError> for LwtError {
    fn from(e: MemoryError) -> Self {
        LwtError::Memory(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = LwtError::NoReceiver;
        assert_eq!(format!("{}", e), "channel has no receiver");

        let e = LwtError::Memory(MemoryError::AllocationFailed);
        assert_eq!(format!("{}", e), "memory error: stack allocation failed");
    }

    #[test]
    fn test_error_conversion() {
        let err: LwtError = MemoryError::ProtectionFailed.into();
        assert!(matches!(err, LwtError::Memory(MemoryError::ProtectionFailed)));
    }

    #[test]
    fn test_group_codes() {
        assert_eq!(LwtError::AlreadyGrouped.code(), -1);
        assert_eq!(LwtError::NotInGroup.code(), -1);
        assert_eq!(LwtError::EventsPending.code(), 1);
    }

    #[test]
    fn test_protocol_class() {
        assert!(LwtError::NoReceiver.is_protocol());
        assert!(LwtError::NoSenders.is_protocol());
        assert!(!LwtError::JoinSelf.is_protocol());
    }
}
