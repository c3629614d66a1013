//! Actor handles and handle allocation.

use crate::constants::HANDLE_NONE_VALUE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of an actor within one process.
///
/// Handles are positive 64-bit integers; zero is the reserved `NONE`
/// sentinel used for envelopes that have no sender. When the handle space
/// is partitioned by per-node offsets a handle also addresses an actor
/// across the cluster.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorHandle(u64);

impl ActorHandle {
    /// The reserved "no actor" handle.
    pub const NONE: ActorHandle = ActorHandle(HANDLE_NONE_VALUE);

    /// Create a handle, rejecting the reserved zero value.
    pub fn new(value: u64) -> Result<Self> {
        if value == HANDLE_NONE_VALUE {
            return Err(Error::InvalidHandle { value });
        }
        Ok(Self(value))
    }

    /// Create a handle from a raw wire value. Zero decodes to `NONE`.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Raw numeric value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// True for the reserved `NONE` sentinel.
    pub const fn is_none(self) -> bool {
        self.0 == HANDLE_NONE_VALUE
    }
}

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic handle allocator seeded by a per-node offset.
///
/// Allocation never returns the reserved zero value: the first handle is
/// `offset + 1`.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    /// Create an allocator whose first handle is `offset + 1`.
    pub fn new(offset: u64) -> Self {
        Self {
            next: AtomicU64::new(offset + 1),
        }
    }

    /// Allocate the next handle.
    pub fn allocate(&self) -> ActorHandle {
        let value = self.next.fetch_add(1, Ordering::SeqCst);
        debug_assert!(value != HANDLE_NONE_VALUE);
        ActorHandle(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_rejects_zero() {
        assert!(ActorHandle::new(0).is_err());
        assert!(ActorHandle::new(1).is_ok());
    }

    #[test]
    fn test_handle_none() {
        assert!(ActorHandle::NONE.is_none());
        assert!(!ActorHandle::from_raw(7).is_none());
    }

    #[test]
    fn test_allocator_starts_after_offset() {
        let alloc = HandleAllocator::new(5000);
        assert_eq!(alloc.allocate().raw(), 5001);
        assert_eq!(alloc.allocate().raw(), 5002);
    }

    #[test]
    fn test_allocator_zero_offset_skips_none() {
        let alloc = HandleAllocator::new(0);
        assert_eq!(alloc.allocate().raw(), 1);
    }
}
