//! Archetype partitions and the dynamic archetype directory.
//!
//! An **archetype** is a partition of storage holding every entity that
//! currently has an identical component-type set. This module defines:
//!
//! * [`Partition`] — one archetype's row bookkeeping: the ordered
//!   row → entity list, the LIFO hole list of reusable rows, the mask, the
//!   ordered component list, and the entity → row record.
//! * [`ArchetypeDirectory`] — the append-only mask → archetype-id mapping
//!   with the reverse mappings (archetype → mask, component → archetypes)
//!   used by query filtering.
//!
//! ## Deletion model
//!
//! Deletion is lazy: a deleted entity's row is tagged with the invalid-entity
//! sentinel and pushed onto the hole list. The row list is never shrunk or
//! reordered by deletion, which makes tagging safe to perform while the same
//! partition is being iterated. Holes are reclaimed LIFO by the next
//! allocation in the same partition, or swept by an explicit repack between
//! ticks.

use std::collections::HashMap;

use crate::engine::intmap::IntMap;
use crate::engine::types::{ArchetypeID, ComponentID, EntityID, Mask, RowIndex, INVALID_ENTITY};

/// Row bookkeeping for one archetype partition.
///
/// ## Invariants
/// - Every column the partition declares has exactly `entities.len()` rows.
/// - A row index present in `holes` holds [`INVALID_ENTITY`] in `entities`.
/// - `rows` maps exactly the live (non-hole) entities to their row index.
/// - `components` is the ascending id list of `mask`'s members.
pub struct Partition {
    mask: Mask,
    components: Vec<ComponentID>,
    entities: Vec<EntityID>,
    holes: Vec<RowIndex>,
    rows: IntMap<RowIndex>,
}

impl Partition {
    /// Creates an empty partition for the given mask.
    pub fn new(mask: Mask) -> Self {
        Self {
            mask,
            components: mask.to_id_list(),
            entities: Vec::new(),
            holes: Vec::new(),
            rows: IntMap::new(),
        }
    }

    /// Returns the partition's component mask.
    #[inline]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Returns the ordered list of component ids this partition stores.
    #[inline]
    pub fn components(&self) -> &[ComponentID] {
        &self.components
    }

    /// Returns the total number of rows, live and holes alike.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns the number of live entities.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.entities.len() - self.holes.len()
    }

    /// Returns the number of pending holes.
    #[inline]
    pub fn hole_count(&self) -> usize {
        self.holes.len()
    }

    /// Returns the entity at `row`, which is [`INVALID_ENTITY`] for holes.
    #[inline]
    pub fn entity_at(&self, row: RowIndex) -> EntityID {
        self.entities[row as usize]
    }

    /// Returns the row → entity list.
    #[inline]
    pub fn entities(&self) -> &[EntityID] {
        &self.entities
    }

    /// Returns the committed row of `entity`, if it lives here.
    #[inline]
    pub fn row_of(&self, entity: EntityID) -> Option<RowIndex> {
        self.rows.get(entity).copied()
    }

    /// Claims a row for `entity`: pops the most recently freed hole if one
    /// exists (LIFO reuse keeps recently touched rows warm), else appends a
    /// fresh row. Returns the row and whether it was appended.
    ///
    /// The caller is responsible for default-filling (hole reuse) or
    /// appending (fresh row) every declared column at the returned row.
    pub fn claim_row(&mut self, entity: EntityID) -> (RowIndex, bool) {
        debug_assert!(entity != INVALID_ENTITY, "cannot claim a row for the invalid entity");
        let (row, appended) = match self.holes.pop() {
            Some(row) => {
                debug_assert_eq!(self.entities[row as usize], INVALID_ENTITY);
                self.entities[row as usize] = entity;
                (row, false)
            }
            None => {
                let row = self.entities.len() as RowIndex;
                self.entities.push(entity);
                (row, true)
            }
        };
        self.rows.put(entity, row);
        (row, appended)
    }

    /// Tags `row` as a hole: writes the invalid-entity sentinel into the
    /// entity slot and pushes the row onto the hole list.
    ///
    /// Never shrinks or reorders the row list, so it is safe to call while
    /// the partition is being iterated. Column values at the row are left in
    /// place; they are overwritten by the default-fill of a future
    /// allocation and never exposed as a live read.
    pub fn tag_hole(&mut self, entity: EntityID, row: RowIndex) {
        debug_assert_eq!(self.entities[row as usize], entity);
        self.entities[row as usize] = INVALID_ENTITY;
        self.holes.push(row);
        self.rows.remove(entity);
    }

    /// Rebinds the entity at `from` to row `to` during repack, updating the
    /// entity list and row record. `to` must currently be a hole slot that
    /// the caller has already removed from the hole list.
    pub(crate) fn relocate_row(&mut self, from: RowIndex, to: RowIndex) {
        let entity = self.entities[from as usize];
        debug_assert!(entity != INVALID_ENTITY);
        self.entities[to as usize] = entity;
        self.entities[from as usize] = INVALID_ENTITY;
        self.rows.put(entity, to);
    }

    /// Truncates the row list to `len` rows and clears the hole list.
    /// Only valid once every hole has been swapped to the tail.
    pub(crate) fn truncate_rows(&mut self, len: usize) {
        debug_assert!(self
            .entities[len..]
            .iter()
            .all(|&entity| entity == INVALID_ENTITY));
        self.entities.truncate(len);
        self.holes.clear();
    }
}

/// Append-only mapping from component masks to archetype identifiers.
///
/// ## Purpose
/// Resolves a mask to a stable archetype id, assigning the next sequential
/// id on first sight, and maintains the reverse mappings used for query
/// filtering: archetype → mask and component → archetypes containing it.
///
/// ## Invariants
/// - An id, once assigned to a mask, is never reassigned; the mapping only
///   grows.
/// - `masks[id]` is the mask `id` was created for.
/// - `by_component[c]` lists exactly the archetypes whose mask contains `c`,
///   in creation order.
pub struct ArchetypeDirectory {
    by_mask: HashMap<Mask, ArchetypeID>,
    masks: Vec<Mask>,
    by_component: Vec<Vec<ArchetypeID>>,
}

impl ArchetypeDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self { by_mask: HashMap::new(), masks: Vec::new(), by_component: Vec::new() }
    }

    /// Returns the number of archetypes created so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// Returns `true` if no archetypes exist.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Returns the archetype id for `mask`, if one has been assigned.
    #[inline]
    pub fn lookup(&self, mask: &Mask) -> Option<ArchetypeID> {
        self.by_mask.get(mask).copied()
    }

    /// Assigns the next sequential archetype id to `mask` and records the
    /// reverse mappings. The caller materializes the partition and columns.
    ///
    /// ## Panics
    /// Panics if `mask` already has an id — ids are never reassigned, so
    /// double insertion is an engine invariant violation.
    pub fn insert(&mut self, mask: Mask) -> ArchetypeID {
        let id = self.masks.len() as ArchetypeID;
        let previous = self.by_mask.insert(mask, id);
        assert!(previous.is_none(), "mask already mapped to archetype {previous:?}");
        self.masks.push(mask);
        for component_id in mask.iter_ids() {
            let index = component_id as usize;
            while self.by_component.len() <= index {
                self.by_component.push(Vec::new());
            }
            self.by_component[index].push(id);
        }
        id
    }

    /// Returns the mask archetype `id` was created for.
    #[inline]
    pub fn mask_of(&self, id: ArchetypeID) -> &Mask {
        &self.masks[id as usize]
    }

    /// Returns every archetype whose mask contains `component_id`, in
    /// creation order.
    #[inline]
    pub fn archetypes_with(&self, component_id: ComponentID) -> &[ArchetypeID] {
        self.by_component
            .get(component_id as usize)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Returns `true` if archetype `id`'s mask shares any member with
    /// `mask`. Implements "without" filters without a dedicated exclusion
    /// index.
    #[inline]
    pub fn overlaps(&self, id: ArchetypeID, mask: &Mask) -> bool {
        self.masks[id as usize].overlaps(mask)
    }

    /// Iterates over all archetype ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ArchetypeID> {
        0..self.masks.len() as ArchetypeID
    }
}

impl Default for ArchetypeDirectory {
    fn default() -> Self {
        Self::new()
    }
}
