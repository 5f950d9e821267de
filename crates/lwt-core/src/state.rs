//! Thread status, creation flags and info query kinds

use core::fmt;

/// Status of a lightweight thread
///
/// A thread is always in exactly one place that matches its status:
/// `ReadyPool` threads sit in the host's ready pool, `Runnable` threads are
/// in the run queue (or executing), the parked statuses are in neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LwtStatus {
    /// Recycled control block waiting to be handed out by `create`
    ReadyPool = 0,

    /// Queued to run, or currently running
    Runnable = 1,

    /// Parked by `block`, `join`, or a remote operation wait
    Blocked = 2,

    /// Parked inside `send` until the receiver takes the payload
    Sending = 3,

    /// Parked inside `receive` or group `wait`
    Receiving = 4,

    /// Finished joinable thread waiting for `join`
    Zombie = 5,

    /// The host's reaper, idle between remote operations
    ReaperReady = 6,
}

impl LwtStatus {
    /// Every status, in declaration order
    pub const ALL: [LwtStatus; 7] = [
        LwtStatus::ReadyPool,
        LwtStatus::Runnable,
        LwtStatus::Blocked,
        LwtStatus::Sending,
        LwtStatus::Receiving,
        LwtStatus::Zombie,
        LwtStatus::ReaperReady,
    ];

    /// Check if `signal` may move this thread back to the run queue
    #[inline]
    pub const fn is_parked(&self) -> bool {
        matches!(self, LwtStatus::Blocked | LwtStatus::Sending | LwtStatus::Receiving)
    }

    /// Check if this status is a valid argument to `block`
    #[inline]
    pub const fn is_block_reason(&self) -> bool {
        self.is_parked()
    }
}

impl From<u8> for LwtStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => LwtStatus::ReadyPool,
            1 => LwtStatus::Runnable,
            2 => LwtStatus::Blocked,
            3 => LwtStatus::Sending,
            4 => LwtStatus::Receiving,
            5 => LwtStatus::Zombie,
            _ => LwtStatus::ReaperReady,
        }
    }
}

impl fmt::Display for LwtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LwtStatus::ReadyPool => "ready-pool",
            LwtStatus::Runnable => "runnable",
            LwtStatus::Blocked => "blocked",
            LwtStatus::Sending => "sending",
            LwtStatus::Receiving => "receiving",
            LwtStatus::Zombie => "zombie",
            LwtStatus::ReaperReady => "reaper-ready",
        };
        f.write_str(s)
    }
}

/// Flags passed to `create`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LwtFlags {
    bits: u8,
}

impl LwtFlags {
    /// Default: joinable
    pub const JOINABLE: LwtFlags = LwtFlags { bits: 0 };

    /// Recycle straight into the ready pool on `die`; cannot be joined
    pub const NOJOIN: LwtFlags = LwtFlags { bits: 1 };

    #[inline]
    pub const fn is_joinable(&self) -> bool {
        self.bits & Self::NOJOIN.bits == 0
    }
}

/// Query kind for `info`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    /// Count threads on the calling host with this status
    Status(LwtStatus),

    /// Count channels on the calling host that still have a receiver
    Channels,
}

impl From<LwtStatus> for InfoKind {
    fn from(s: LwtStatus) -> Self {
        InfoKind::Status(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parked_statuses() {
        assert!(LwtStatus::Blocked.is_parked());
        assert!(LwtStatus::Sending.is_parked());
        assert!(LwtStatus::Receiving.is_parked());

        assert!(!LwtStatus::Runnable.is_parked());
        assert!(!LwtStatus::Zombie.is_parked());
        assert!(!LwtStatus::ReadyPool.is_parked());
        assert!(!LwtStatus::ReaperReady.is_parked());
    }

    #[test]
    fn test_status_roundtrip_u8() {
        for s in LwtStatus::ALL {
            assert_eq!(LwtStatus::from(s as u8), s);
        }
    }

    #[test]
    fn test_flags() {
        assert!(LwtFlags::default().is_joinable());
        assert!(LwtFlags::JOINABLE.is_joinable());
        assert!(!LwtFlags::NOJOIN.is_joinable());
    }
}
