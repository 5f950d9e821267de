//! Identifier types
//!
//! Thread ids are handed out from one process-wide counter starting at 1,
//! so an id is unique across every host for the life of the process.
//! Channel and host ids follow the same scheme with their own counters.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

static NEXT_LWT_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_CHAN_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_HOST_ID: AtomicU32 = AtomicU32::new(1);

/// Unique identifier for a lightweight thread
///
/// The maximum value (u32::MAX) is reserved as a sentinel for "no thread".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct LwtId(u32);

impl LwtId {
    /// Sentinel value indicating no thread
    pub const NONE: LwtId = LwtId(u32::MAX);

    /// Create a new LwtId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        LwtId(id)
    }

    /// Allocate the next process-wide id
    pub fn next() -> Self {
        LwtId(NEXT_LWT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Check if this is a valid thread id
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u32::MAX
    }
}

impl From<LwtId> for u32 {
    #[inline]
    fn from(id: LwtId) -> Self {
        id.0
    }
}

impl fmt::Debug for LwtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "LwtId(NONE)")
        } else {
            write!(f, "LwtId({})", self.0)
        }
    }
}

impl fmt::Display for LwtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for LwtId {
    fn default() -> Self {
        LwtId::NONE
    }
}

/// Unique identifier for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ChanId(u32);

impl ChanId {
    pub fn next() -> Self {
        ChanId(NEXT_CHAN_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Identifier of a host (one per OS thread running a scheduler)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HostId(u32);

impl HostId {
    pub fn next() -> Self {
        HostId(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lwt_id_basics() {
        let id = LwtId::new(42);
        assert_eq!(id.as_u32(), 42);
        assert!(!id.is_none());
        assert!(id.is_some());
        assert_eq!(format!("{}", id), "42");
        assert_eq!(format!("{}", LwtId::NONE), "none");
    }

    #[test]
    fn test_next_is_unique_and_nonzero() {
        let a = LwtId::next();
        let b = LwtId::next();
        assert_ne!(a, b);
        assert!(a.as_u32() >= 1);
        assert!(b > a);
    }

    #[test]
    fn test_chan_and_host_ids() {
        let c1 = ChanId::next();
        let c2 = ChanId::next();
        assert_ne!(c1, c2);
        let h = HostId::next();
        assert!(format!("{}", h).starts_with('h'));
    }
}
