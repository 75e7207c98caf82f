//! Core identifiers, bit-level component masks, and type-erased bundles.
//!
//! This module defines the **fundamental types, identifiers, and bit layouts**
//! shared across all subsystems of the engine: entity management, archetype
//! partitioning, queries, command staging, and scheduling.
//!
//! ## Design Philosophy
//!
//! The engine is designed around:
//!
//! - **Dense storage** — component data lives in flat columns.
//! - **Bitset-based masks** — component sets are fixed-width bit arrays.
//! - **Stable numeric identifiers** — every concept has a small, copyable id.
//! - **Explicit access declaration** — schedulers see reads and writes as
//!   mask pairs.
//!
//! ## Entity Representation
//!
//! Entities are opaque `u64` values. The value `0` is reserved as the
//! invalid/absent sentinel ([`INVALID_ENTITY`]) and is never handed out by
//! the allocator. An entity has no intrinsic data; it only has a location
//! inside exactly one archetype partition (or none, if deleted).
//!
//! ## Masks
//!
//! A [`Mask`] is a fixed 256-bit set of component ids stored as four `u64`
//! blocks. Masks are value-comparable and hashable, which makes them the key
//! of the archetype directory: two entities with equal masks live in the same
//! partition.
//!
//! ## Bundles
//!
//! [`Bundle`] is a type-erased group of component values, used when a whole
//! row must be rebuilt into a different partition (component removal by mask
//! diffing) and by the command buffer's staging accumulators.

use std::any::Any;

/// Globally unique entity identifier. `0` is reserved invalid.
pub type EntityID = u64;
/// Compact identifier for a registered component type.
pub type ComponentID = u16;
/// Dense, monotonically assigned identifier for an archetype partition.
pub type ArchetypeID = u32;
/// Row index within a partition.
pub type RowIndex = u32;
/// Simulation tick counter.
pub type Tick = u64;

/// Reserved sentinel meaning "no entity". Never allocated, never a valid
/// write target, and stored in partition rows that have been tagged as holes.
pub const INVALID_ENTITY: EntityID = 0;

/// Number of `u64` blocks in a [`Mask`].
pub const MASK_BLOCKS: usize = 4;
/// Maximum number of distinct registered component types, fixed by the mask
/// width (`MASK_BLOCKS * 64`).
pub const COMPONENT_CAP: usize = MASK_BLOCKS * 64;

/// Fixed-width bitset describing a set of component ids.
///
/// ## Purpose
/// A mask identifies an archetype's component-type set and drives query
/// matching. All operations are pure, allocation-free bit manipulation.
///
/// ## Invariants
/// - Bit `i` set means component id `i` is a member.
/// - Only bits below [`COMPONENT_CAP`] are ever set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mask {
    /// Packed component bitset.
    pub blocks: [u64; MASK_BLOCKS],
}

impl Mask {
    /// Creates an empty mask.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mask from a list of component ids.
    pub fn from_ids(component_ids: &[ComponentID]) -> Self {
        let mut mask = Self::default();
        for &component_id in component_ids {
            mask.set(component_id);
        }
        mask
    }

    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bit = (component_id as usize) % 64;
        self.blocks[index] |= 1u64 << bit;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bit = (component_id as usize) % 64;
        self.blocks[index] &= !(1u64 << bit);
    }

    /// Returns `true` if `component_id` is a member of this mask.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bit = (component_id as usize) % 64;
        (self.blocks[index] >> bit) & 1 == 1
    }

    /// Returns `true` if no bits are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&block| block == 0)
    }

    /// Returns the number of set bits.
    #[inline]
    pub fn count(&self) -> usize {
        self.blocks.iter().map(|block| block.count_ones() as usize).sum()
    }

    /// Returns the union of `self` and `other`.
    #[inline]
    pub fn union(&self, other: &Mask) -> Mask {
        let mut out = *self;
        for (block, other_block) in out.blocks.iter_mut().zip(other.blocks.iter()) {
            *block |= other_block;
        }
        out
    }

    /// Returns the intersection of `self` and `other`.
    #[inline]
    pub fn intersect(&self, other: &Mask) -> Mask {
        let mut out = *self;
        for (block, other_block) in out.blocks.iter_mut().zip(other.blocks.iter()) {
            *block &= other_block;
        }
        out
    }

    /// Returns the members of `self` that are not members of `other`.
    #[inline]
    pub fn difference(&self, other: &Mask) -> Mask {
        let mut out = *self;
        for (block, other_block) in out.blocks.iter_mut().zip(other.blocks.iter()) {
            *block &= !other_block;
        }
        out
    }

    /// Returns `true` if every member of `required` is also a member of
    /// `self`. Used to decide archetype membership for queries.
    #[inline]
    pub fn contains_all(&self, required: &Mask) -> bool {
        self.blocks
            .iter()
            .zip(required.blocks.iter())
            .all(|(block, required_block)| (block & required_block) == *required_block)
    }

    /// Returns `true` if `self` and `other` share at least one member.
    /// Used to apply "without" filters cheaply.
    #[inline]
    pub fn overlaps(&self, other: &Mask) -> bool {
        self.blocks
            .iter()
            .zip(other.blocks.iter())
            .any(|(block, other_block)| (block & other_block) != 0)
    }

    /// Iterates over all component ids set in this mask, ascending.
    pub fn iter_ids(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.blocks.iter().enumerate().flat_map(|(block_index, &block)| {
            let base = block_index * 64;
            let mut bits = block;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((base + tz) as ComponentID)
            })
        })
    }

    /// Collects the set component ids into a vector, ascending.
    pub fn to_id_list(&self) -> Vec<ComponentID> {
        self.iter_ids().collect()
    }
}

/// Declares the component access set of a system or query.
///
/// ## Purpose
/// Schedulers derive lock requirements and conflict relations from these
/// masks: reads may be shared, writes are exclusive.
#[derive(Clone, Debug, Default)]
pub struct AccessSets {
    /// Components read by the declaring unit.
    pub read: Mask,
    /// Components written by the declaring unit.
    pub write: Mask,
}

impl AccessSets {
    /// Returns `true` if this access set conflicts with another.
    ///
    /// Conflict exists iff (W ∩ W), (W ∩ R), or (R ∩ W) is nonempty.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        self.write.overlaps(&other.write)
            || self.write.overlaps(&other.read)
            || self.read.overlaps(&other.write)
    }

    /// Returns the union of the read and write masks.
    #[inline]
    pub fn touched(&self) -> Mask {
        self.read.union(&self.write)
    }
}

/// Type-erased container of component values.
///
/// ## Purpose
/// Groups heterogeneous component values for structural operations: row
/// snapshots during migration, and staged command payloads. Bundles trade
/// compile-time typing for flexibility and stay out of hot iteration paths.
///
/// ## Invariants
/// - `mask` has exactly the bits of the component ids present in `values`.
/// - At most one value per component id.
pub struct Bundle {
    mask: Mask,
    values: Vec<(ComponentID, Box<dyn Any + Send>)>,
}

impl Bundle {
    /// Creates an empty bundle.
    #[inline]
    pub fn new() -> Self {
        Self { mask: Mask::default(), values: Vec::new() }
    }

    /// Removes all stored values.
    #[inline]
    pub fn clear(&mut self) {
        self.mask = Mask::default();
        self.values.clear();
    }

    /// Returns the mask of component ids present in this bundle.
    #[inline]
    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// Returns `true` if no values are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Inserts a boxed component value, replacing any previous value for the
    /// same component id.
    pub fn insert_boxed(&mut self, component_id: ComponentID, value: Box<dyn Any + Send>) {
        if self.mask.has(component_id) {
            if let Some(slot) = self.values.iter_mut().find(|(id, _)| *id == component_id) {
                slot.1 = value;
                return;
            }
        }
        self.mask.set(component_id);
        self.values.push((component_id, value));
    }

    /// Inserts a typed component value.
    #[inline]
    pub fn insert<T: Any + Send>(&mut self, component_id: ComponentID, value: T) {
        self.insert_boxed(component_id, Box::new(value));
    }

    /// Removes and returns the value for `component_id`, if present.
    pub fn take(&mut self, component_id: ComponentID) -> Option<Box<dyn Any + Send>> {
        let index = self.values.iter().position(|(id, _)| *id == component_id)?;
        self.mask.clear(component_id);
        let (_, value) = self.values.swap_remove(index);
        Some(value)
    }

    /// Drains all values in unspecified order.
    pub fn drain(&mut self) -> impl Iterator<Item = (ComponentID, Box<dyn Any + Send>)> + '_ {
        self.mask = Mask::default();
        self.values.drain(..)
    }
}

impl Default for Bundle {
    fn default() -> Self {
        Self::new()
    }
}
