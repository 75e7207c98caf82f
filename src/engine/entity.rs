//! Entity id allocation.
//!
//! Entity ids are opaque `u64` values drawn from an atomically incremented
//! counter wrapped into a configurable `[min, max)` range, so multiple stores
//! in one process can be handed disjoint id spaces. Id `0` is the reserved
//! invalid sentinel and is never produced.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::types::{EntityID, INVALID_ENTITY};

/// Atomic, range-wrapped entity id allocator.
///
/// ## Invariants
/// - Never yields [`INVALID_ENTITY`].
/// - Yields ids only inside `[min, max)`.
/// - Ids are unique until the counter wraps the range span; liveness beyond
///   that is the store's concern (an id is unique while live).
pub struct EntityAllocator {
    counter: AtomicU64,
    min: u64,
    span: u64,
}

impl EntityAllocator {
    /// Creates an allocator over `[min, max)`.
    ///
    /// ## Panics
    /// Panics if the range is empty or contains only the invalid sentinel —
    /// caller misuse, reported at the point of construction.
    pub fn new(min: u64, max: u64) -> Self {
        assert!(min < max, "entity id range [{min}, {max}) is empty");
        let min = if min == INVALID_ENTITY { min + 1 } else { min };
        assert!(min < max, "entity id range holds only the reserved invalid id");
        Self { counter: AtomicU64::new(0), min, span: max - min }
    }

    /// Allocates the next entity id.
    #[inline]
    pub fn allocate(&self) -> EntityID {
        let raw = self.counter.fetch_add(1, Ordering::Relaxed);
        self.min + raw % self.span
    }

    /// Returns the number of ids handed out so far.
    #[inline]
    pub fn allocated(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for EntityAllocator {
    /// Full-range allocator: every id except the invalid sentinel.
    fn default() -> Self {
        Self::new(1, u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_yields_invalid() {
        let allocator = EntityAllocator::new(0, 8);
        for _ in 0..32 {
            assert_ne!(allocator.allocate(), INVALID_ENTITY);
        }
    }

    #[test]
    fn disjoint_ranges_do_not_collide() {
        let a = EntityAllocator::new(1, 1_000);
        let b = EntityAllocator::new(1_000, 2_000);
        for _ in 0..500 {
            let id_a = a.allocate();
            let id_b = b.allocate();
            assert!((1..1_000).contains(&id_a));
            assert!((1_000..2_000).contains(&id_b));
        }
    }

    #[test]
    fn wraps_inside_range() {
        let allocator = EntityAllocator::new(10, 13);
        let ids: Vec<_> = (0..6).map(|_| allocator.allocate()).collect();
        assert_eq!(ids, vec![10, 11, 12, 10, 11, 12]);
    }
}
