//! Numeric identity for loaded bundles and their topics.
//!
//! Every loaded bundle index gets a top-level ID from the allocator; every
//! topic inside an index already carries a 32-bit node ID. [`NavigatorId`]
//! packs both into one 64-bit value so any topic across all loaded bundles is
//! globally addressable without collision.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Issues strictly increasing 32-bit top-level identifiers.
///
/// IDs are never reused, even after the bundle they were issued for is
/// removed. The counter is the single serialized mutation point for issuance,
/// so concurrent callers can never observe a duplicate.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    /// Creates an allocator starting from 0.
    pub const fn new() -> Self {
        Self::starting_from(0)
    }

    /// Creates an allocator starting from a custom base.
    pub const fn starting_from(base: u32) -> Self {
        Self {
            next: AtomicU32::new(base),
        }
    }

    /// Returns the next identifier.
    ///
    /// # Panics
    ///
    /// Panics when the 32-bit identifier space is exhausted. Wrapping around
    /// silently would alias two bundles' topic address spaces.
    #[allow(clippy::panic)]
    pub fn next(&self) -> u32 {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .unwrap_or_else(|_| panic!("top-level identifier space exhausted"))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compound identifier addressing one topic node across all loaded bundles.
///
/// The raw value packs the within-index node ID into the upper 32 bits and the
/// allocator-issued top-level ID into the lower 32 bits. Composition and
/// decomposition are exact inverses; a composite is only meaningful while its
/// top-level ID exists in the navigator's index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NavigatorId(u64);

impl NavigatorId {
    /// Composes an ID from its two halves.
    pub const fn new(top_level_id: u32, node_id: u32) -> Self {
        Self(((node_id as u64) << 32) | top_level_id as u64)
    }

    /// Reinterprets a raw 64-bit value as a composite ID.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The packed 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The allocator-issued ID of the owning index.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn top_level_id(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// The node ID within the owning index.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn node_id(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for NavigatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.top_level_id(), self.node_id())
    }
}
