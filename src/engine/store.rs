//! Store facade and orchestration layer.
//!
//! This module defines the central orchestration layer of the engine,
//! responsible for:
//!
//! * owning the archetype directory, partitions, and component tables,
//! * coordinating entity movement between partitions (migration),
//! * entity id allocation and the entity → archetype location map,
//! * per-store resources keyed by value type,
//! * the store-wide generation counter consumed by the query cache,
//! * the explicit, opt-in repack operation.
//!
//! ## Concurrency model
//!
//! The store is internally mutable and uses `UnsafeCell` to allow aliasing
//! between shared (`&`) and exclusive (`&mut`) access paths. Safety is
//! enforced by *API discipline*, not the Rust borrow checker:
//!
//! * The storage engine itself provides no internal locking.
//! * During scheduler ticks, data-race freedom comes from the scheduler's
//!   per-component lock table derived from declared access sets.
//! * Outside the scheduler, callers mutating or migrating entities
//!   concurrently with iteration over the same partition must serialize
//!   externally. The lazy-delete path ([`Store::delete`]) is the exception:
//!   it only tags holes, never shrinks or reorders rows, and is therefore
//!   loop-safe. Repack is *not* loop-safe and must run between ticks.
//!
//! ## Reference invalidation
//!
//! [`Store::read_ref`] and [`Store::get_resource`] hand out references into
//! live storage. Any subsequent write, delete, or migration anywhere in the
//! store may reallocate the underlying columns; callers must not retain
//! such references across structural calls.

use std::any::{Any, TypeId};
use std::cell::UnsafeCell;
use std::collections::HashMap;

use crate::engine::archetype::{ArchetypeDirectory, Partition};
use crate::engine::component::{component_id_of, register_component, Component};
use crate::engine::entity::EntityAllocator;
use crate::engine::intmap::IntMap;
use crate::engine::storage::ComponentTables;
use crate::engine::types::{
    ArchetypeID, Bundle, ComponentID, EntityID, Mask, RowIndex, INVALID_ENTITY,
};

/// Policy deciding when [`Store::maybe_repack`] compacts a partition.
///
/// The hole-accumulation trade-off has no universally right threshold, so
/// the trigger is configuration rather than a built-in constant.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum RepackPolicy {
    /// Never compact automatically; only explicit `repack` calls do.
    #[default]
    Manual,
    /// Compact partitions holding at least this many holes.
    HoleCount(usize),
    /// Compact partitions whose live/total row ratio falls below this value.
    FillRatio(f64),
}

/// Construction-time configuration for a [`Store`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Entity ids are drawn from `[id_min, id_max)`; give stores disjoint
    /// ranges to keep their id spaces disjoint.
    pub id_min: u64,
    /// Exclusive upper bound of the entity id range.
    pub id_max: u64,
    /// Automatic repack trigger consulted by [`Store::maybe_repack`].
    pub repack: RepackPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { id_min: 1, id_max: u64::MAX, repack: RepackPolicy::Manual }
    }
}

/// Core storage state: directory, partitions, columns, locations, resources.
///
/// ## Invariants
/// * `partitions[id]` exists for every id the directory has assigned.
/// * `locations` maps exactly the live entities to the partition whose row
///   record contains them.
/// * Every partition's columns have exactly its row-list length.
pub struct StoreData {
    directory: ArchetypeDirectory,
    partitions: Vec<Partition>,
    tables: ComponentTables,
    locations: IntMap<ArchetypeID>,
    allocator: EntityAllocator,
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    generation: u64,
    repack_policy: RepackPolicy,
}

impl StoreData {
    fn new(config: StoreConfig) -> Self {
        Self {
            directory: ArchetypeDirectory::new(),
            partitions: Vec::new(),
            tables: ComponentTables::new(),
            locations: IntMap::new(),
            allocator: EntityAllocator::new(config.id_min, config.id_max),
            resources: HashMap::new(),
            generation: 0,
            repack_policy: config.repack,
        }
    }

    /// Returns the archetype directory.
    #[inline]
    pub fn directory(&self) -> &ArchetypeDirectory {
        &self.directory
    }

    /// Returns the partition record for `archetype`.
    #[inline]
    pub fn partition(&self, archetype: ArchetypeID) -> &Partition {
        &self.partitions[archetype as usize]
    }

    /// Returns the component tables.
    #[inline]
    pub fn tables(&self) -> &ComponentTables {
        &self.tables
    }

    /// Returns the component tables mutably.
    #[inline]
    pub fn tables_mut(&mut self) -> &mut ComponentTables {
        &mut self.tables
    }

    /// Returns the store generation: the count of archetypes created so far.
    /// Query caches compare against this to decide whether to recompute.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the committed location of `entity`, if it has one.
    #[inline]
    pub fn location_of(&self, entity: EntityID) -> Option<(ArchetypeID, RowIndex)> {
        let archetype = *self.locations.get(entity)?;
        let row = self.partitions[archetype as usize].row_of(entity)?;
        Some((archetype, row))
    }

    /// Resolves `mask` to its archetype id, creating the partition, its
    /// columns, and the reverse mappings on first sight and bumping the
    /// store generation.
    pub fn get_or_create_archetype(&mut self, mask: Mask) -> ArchetypeID {
        if let Some(id) = self.directory.lookup(&mask) {
            return id;
        }
        let id = self.directory.insert(mask);
        self.partitions.push(Partition::new(mask));
        for component_id in mask.iter_ids() {
            self.tables.ensure_column(component_id, id);
        }
        self.generation += 1;
        log::debug!(
            "created archetype {id} ({} components, generation {})",
            mask.count(),
            self.generation
        );
        id
    }

    /// Claims a row for `entity` in `archetype` and default-initializes
    /// every declared column at that row: appended columns grow by one,
    /// reused hole rows are overwritten in place so a recycled row never
    /// exposes the previous occupant's values.
    pub fn allocate_row(&mut self, archetype: ArchetypeID, entity: EntityID) -> RowIndex {
        let (row, appended) = self.partitions[archetype as usize].claim_row(entity);
        let component_count = self.partitions[archetype as usize].components().len();
        for index in 0..component_count {
            let component_id = self.partitions[archetype as usize].components()[index];
            let column = self
                .tables
                .column_mut(component_id, archetype)
                .unwrap_or_else(|| {
                    panic!("partition {archetype} declares component {component_id} without a column")
                });
            if appended {
                column.push_default();
            } else {
                column.write_default(row as usize);
            }
        }
        debug_assert!(self.columns_aligned(archetype));
        row
    }

    /// Moves `entity`'s row to the partition for `new_mask`: resolves or
    /// creates the destination, allocates a row there, copies every
    /// component the destination shares with the source, and tags the old
    /// row a hole. Always goes through directory lookup-or-create; there
    /// is no archetype transition graph.
    pub fn migrate(
        &mut self,
        entity: EntityID,
        source: (ArchetypeID, RowIndex),
        new_mask: Mask,
    ) -> (ArchetypeID, RowIndex) {
        let (source_archetype, source_row) = source;
        let source_mask = *self.partitions[source_archetype as usize].mask();
        debug_assert!(source_mask != new_mask, "migration requires a mask change");

        let destination = self.get_or_create_archetype(new_mask);
        let destination_row = self.allocate_row(destination, entity);

        let shared = source_mask.intersect(&new_mask);
        for component_id in shared.iter_ids() {
            let value = self
                .tables
                .read_boxed(component_id, source_archetype, source_row)
                .unwrap_or_else(|| {
                    panic!(
                        "source archetype {source_archetype} lost its column for component {component_id}"
                    )
                });
            self.tables.write_boxed(component_id, destination, destination_row, value);
        }

        self.partitions[source_archetype as usize].tag_hole(entity, source_row);
        self.locations.put(entity, destination);
        log::trace!(
            "migrated entity {entity} from archetype {source_archetype} to {destination}"
        );
        (destination, destination_row)
    }

    /// Writes one typed component value, creating the entity's first
    /// location, writing in place when the mask is unchanged, or migrating
    /// when the write adds a new component type.
    pub fn write_component<T: Component>(&mut self, entity: EntityID, value: T) {
        assert!(
            entity != INVALID_ENTITY,
            "write addressed to the reserved invalid entity id"
        );
        let component_id = register_component::<T>();

        match self.locations.get(entity).copied() {
            None => {
                let mask = Mask::from_ids(&[component_id]);
                let archetype = self.get_or_create_archetype(mask);
                let row = self.allocate_row(archetype, entity);
                self.tables.write_value(component_id, archetype, row, value);
                self.locations.put(entity, archetype);
            }
            Some(archetype) => {
                let partition = &self.partitions[archetype as usize];
                if partition.mask().has(component_id) {
                    // Mask unchanged: plain in-place column write, no copy.
                    let row = partition.row_of(entity).unwrap_or_else(|| {
                        panic!("entity {entity} mapped to archetype {archetype} without a row")
                    });
                    self.tables.write_value(component_id, archetype, row, value);
                } else {
                    let row = partition.row_of(entity).unwrap_or_else(|| {
                        panic!("entity {entity} mapped to archetype {archetype} without a row")
                    });
                    let mut new_mask = *partition.mask();
                    new_mask.set(component_id);
                    let (destination, destination_row) =
                        self.migrate(entity, (archetype, row), new_mask);
                    self.tables.write_value(component_id, destination, destination_row, value);
                }
            }
        }
    }

    /// Writes a whole bundle of component values with a single migration,
    /// regardless of how many new component types the bundle introduces.
    pub fn write_bundle(&mut self, entity: EntityID, mut bundle: Bundle) {
        self.apply_bundle(entity, &mut bundle);
    }

    /// Drains `bundle` into `entity`'s row with a single migration. The
    /// bundle keeps its allocation, which lets command-buffer accumulators
    /// return to their pool without reallocating.
    pub fn apply_bundle(&mut self, entity: EntityID, bundle: &mut Bundle) {
        assert!(
            entity != INVALID_ENTITY,
            "write addressed to the reserved invalid entity id"
        );
        if bundle.is_empty() {
            return;
        }

        let staged_mask = bundle.mask();
        let (archetype, row) = match self.locations.get(entity).copied() {
            None => {
                let archetype = self.get_or_create_archetype(staged_mask);
                let row = self.allocate_row(archetype, entity);
                self.locations.put(entity, archetype);
                (archetype, row)
            }
            Some(archetype) => {
                let partition = &self.partitions[archetype as usize];
                let row = partition.row_of(entity).unwrap_or_else(|| {
                    panic!("entity {entity} mapped to archetype {archetype} without a row")
                });
                let new_mask = partition.mask().union(&staged_mask);
                if new_mask == *partition.mask() {
                    (archetype, row)
                } else {
                    self.migrate(entity, (archetype, row), new_mask)
                }
            }
        };

        for (component_id, value) in bundle.drain() {
            self.tables.write_boxed(component_id, archetype, row, value);
        }
    }

    /// Reads a component value by clone. Absence (unknown entity,
    /// unregistered type, or a partition that does not declare the
    /// component) is a normal `None`.
    pub fn read_component<T: Component>(&self, entity: EntityID) -> Option<T> {
        self.read_component_ref(entity).cloned()
    }

    /// Reads a component by reference. The reference is invalidated by any
    /// subsequent write, delete, or migration anywhere in the store.
    pub fn read_component_ref<T: Component>(&self, entity: EntityID) -> Option<&T> {
        let component_id = component_id_of::<T>()?;
        let archetype = *self.locations.get(entity)?;
        let partition = &self.partitions[archetype as usize];
        if !partition.mask().has(component_id) {
            return None;
        }
        let row = partition.row_of(entity)?;
        self.tables.typed::<T>(component_id, archetype)?.get(row as usize)
    }

    /// Materializes a bundle holding a clone of every component the
    /// entity's row currently stores.
    pub fn read_entire_row(&self, entity: EntityID) -> Option<Bundle> {
        let archetype = *self.locations.get(entity)?;
        let partition = &self.partitions[archetype as usize];
        let row = partition.row_of(entity)?;
        let mut bundle = Bundle::new();
        for &component_id in partition.components() {
            let value = self.tables.read_boxed(component_id, archetype, row).unwrap_or_else(|| {
                panic!("partition {archetype} declares component {component_id} without a column")
            });
            bundle.insert_boxed(component_id, value);
        }
        Some(bundle)
    }

    /// Deletes `entity`: tags its row a hole and drops the location entry.
    /// Returns whether the entity was present. Columns are not compacted, so
    /// this path is safe to call during iteration over the same partition.
    pub fn delete(&mut self, entity: EntityID) -> bool {
        let Some(archetype) = self.locations.remove(entity) else {
            return false;
        };
        let partition = &mut self.partitions[archetype as usize];
        let row = partition.row_of(entity).unwrap_or_else(|| {
            panic!("entity {entity} mapped to archetype {archetype} without a row")
        });
        partition.tag_hole(entity, row);
        true
    }

    /// Removes the named components from `entity`. If nothing remains the
    /// entity is fully removed. Returns whether the entity was present.
    pub fn delete_components(&mut self, entity: EntityID, component_ids: &[ComponentID]) -> bool {
        let Some(archetype) = self.locations.get(entity).copied() else {
            return false;
        };
        let removed = Mask::from_ids(component_ids);
        let old_mask = *self.partitions[archetype as usize].mask();
        let new_mask = old_mask.difference(&removed);
        if new_mask == old_mask {
            return true;
        }
        if new_mask.is_empty() {
            return self.delete(entity);
        }
        let row = self.partitions[archetype as usize].row_of(entity).unwrap_or_else(|| {
            panic!("entity {entity} mapped to archetype {archetype} without a row")
        });
        self.migrate(entity, (archetype, row), new_mask);
        true
    }

    /// Returns `true` if `entity` currently has a location.
    #[inline]
    pub fn exists(&self, entity: EntityID) -> bool {
        self.locations.contains(entity)
    }

    /// Returns the resource of type `T`, if registered.
    pub fn resource<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.resources.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    /// Returns the resource of type `T` mutably, if registered.
    pub fn resource_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.resources.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    /// Compacts one partition with swap-with-last-live-row semantics,
    /// updating the partition's row records and truncating every column.
    ///
    /// Must not run concurrently with iteration over the same partition;
    /// intended to be invoked between ticks.
    pub fn repack(&mut self, archetype: ArchetypeID) {
        if self.partitions[archetype as usize].hole_count() == 0 {
            return;
        }
        let components = self.partitions[archetype as usize].components().to_vec();
        let mut len = self.partitions[archetype as usize].row_count();

        // Trailing holes need no swap, only truncation.
        let trim_tail = |partitions: &Vec<Partition>, len: &mut usize| {
            while *len > 0
                && partitions[archetype as usize].entity_at((*len - 1) as RowIndex)
                    == INVALID_ENTITY
            {
                *len -= 1;
            }
        };

        trim_tail(&self.partitions, &mut len);
        let mut row = 0;
        while row < len {
            if self.partitions[archetype as usize].entity_at(row as RowIndex) == INVALID_ENTITY {
                let last = len - 1;
                for &component_id in &components {
                    self.tables
                        .column_mut(component_id, archetype)
                        .unwrap_or_else(|| {
                            panic!(
                                "partition {archetype} declares component {component_id} without a column"
                            )
                        })
                        .swap_rows(row, last);
                }
                self.partitions[archetype as usize]
                    .relocate_row(last as RowIndex, row as RowIndex);
                len = last;
                trim_tail(&self.partitions, &mut len);
            }
            row += 1;
        }

        self.partitions[archetype as usize].truncate_rows(len);
        for &component_id in &components {
            self.tables
                .column_mut(component_id, archetype)
                .unwrap_or_else(|| {
                    panic!(
                        "partition {archetype} declares component {component_id} without a column"
                    )
                })
                .truncate(len);
        }
        log::debug!("repacked archetype {archetype} to {len} rows");
    }

    /// Compacts every partition the configured [`RepackPolicy`] selects.
    pub fn maybe_repack(&mut self) {
        let policy = self.repack_policy;
        for id in 0..self.partitions.len() as ArchetypeID {
            let partition = &self.partitions[id as usize];
            let trigger = match policy {
                RepackPolicy::Manual => false,
                RepackPolicy::HoleCount(threshold) => partition.hole_count() >= threshold,
                RepackPolicy::FillRatio(ratio) => {
                    partition.row_count() > 0
                        && (partition.live_count() as f64)
                            < ratio * partition.row_count() as f64
                }
            };
            if trigger {
                self.repack(id);
            }
        }
    }
}

impl StoreData {
    #[cfg(debug_assertions)]
    fn columns_aligned(&self, archetype: ArchetypeID) -> bool {
        let partition = &self.partitions[archetype as usize];
        partition.components().iter().all(|&component_id| {
            self.tables
                .column(component_id, archetype)
                .map(|column| column.len() == partition.row_count())
                .unwrap_or(false)
        })
    }

    #[cfg(not(debug_assertions))]
    fn columns_aligned(&self, _archetype: ArchetypeID) -> bool {
        true
    }
}

/// Thread-shareable entry point to the storage engine.
///
/// ## Role
/// `Store` owns the entire engine state and provides controlled access
/// through lightweight [`StoreRef`] handles. It is designed to be shared
/// across scheduler threads while enforcing safety via interior mutability
/// plus the scheduler's component lock table.
///
/// ## Concurrency
/// * `Store` is `Sync`; all mutation occurs through `UnsafeCell<StoreData>`.
/// * Callers must respect the access discipline documented at the module
///   level; the borrow checker does not enforce it here.
pub struct Store {
    inner: UnsafeCell<StoreData>,
}

unsafe impl Send for Store {}
unsafe impl Sync for Store {}

impl Store {
    /// Creates a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with an explicit configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self { inner: UnsafeCell::new(StoreData::new(config)) }
    }

    /// Returns a lightweight shareable handle to the store.
    #[inline]
    pub fn store_ref(&self) -> StoreRef<'_> {
        StoreRef { inner: &self.inner }
    }

    /// Allocates a fresh entity id. The entity has no location until its
    /// first component write.
    #[inline]
    pub fn new_entity(&self) -> EntityID {
        unsafe { &*self.inner.get() }.allocator.allocate()
    }

    /// Writes one component value to `entity`; see
    /// [`StoreData::write_component`].
    pub fn write<T: Component>(&self, entity: EntityID, value: T) {
        unsafe { &mut *self.inner.get() }.write_component(entity, value)
    }

    /// Writes a bundle of component values with at most one migration.
    pub fn write_bundle(&self, entity: EntityID, bundle: Bundle) {
        unsafe { &mut *self.inner.get() }.write_bundle(entity, bundle)
    }

    /// Reads a component value by clone; `None` is the normal absent case.
    pub fn read<T: Component>(&self, entity: EntityID) -> Option<T> {
        unsafe { &*self.inner.get() }.read_component(entity)
    }

    /// Reads a component by reference. Invalidated by any subsequent write,
    /// delete, or migration anywhere in the store; do not retain across
    /// structural calls.
    pub fn read_ref<T: Component>(&self, entity: EntityID) -> Option<&T> {
        unsafe { &*self.inner.get() }.read_component_ref(entity)
    }

    /// Materializes a snapshot bundle of every component `entity` holds.
    pub fn read_entire_row(&self, entity: EntityID) -> Option<Bundle> {
        unsafe { &*self.inner.get() }.read_entire_row(entity)
    }

    /// Deletes `entity`; returns whether it was present. Loop-safe (lazy
    /// hole tagging, no compaction).
    pub fn delete(&self, entity: EntityID) -> bool {
        unsafe { &mut *self.inner.get() }.delete(entity)
    }

    /// Removes component `T` from `entity`; full removal if nothing
    /// remains. Returns whether the entity was present.
    pub fn delete_component<T: Component>(&self, entity: EntityID) -> bool {
        match component_id_of::<T>() {
            Some(component_id) => self.delete_components(entity, &[component_id]),
            None => self.exists(entity),
        }
    }

    /// Removes the named components from `entity`; full removal if nothing
    /// remains. Returns whether the entity was present.
    pub fn delete_components(&self, entity: EntityID, component_ids: &[ComponentID]) -> bool {
        unsafe { &mut *self.inner.get() }.delete_components(entity, component_ids)
    }

    /// Returns `true` if `entity` currently has a location.
    pub fn exists(&self, entity: EntityID) -> bool {
        unsafe { &*self.inner.get() }.exists(entity)
    }

    /// Stores a per-store singleton resource keyed by its value type,
    /// replacing any previous value of that type.
    pub fn put_resource<T: Any + Send + Sync>(&self, value: T) {
        let data = unsafe { &mut *self.inner.get() };
        data.resources.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns the resource of type `T`, if registered. Subject to the same
    /// invalidation contract as [`Store::read_ref`].
    pub fn get_resource<T: Any + Send + Sync>(&self) -> Option<&T> {
        unsafe { &*self.inner.get() }.resource::<T>()
    }

    /// Returns the resource of type `T` mutably, if registered.
    pub fn get_resource_mut<T: Any + Send + Sync>(&self) -> Option<&mut T> {
        unsafe { &mut *self.inner.get() }.resource_mut::<T>()
    }

    /// Returns the store generation (count of archetypes created).
    pub fn generation(&self) -> u64 {
        unsafe { &*self.inner.get() }.generation()
    }

    /// Compacts one partition; see [`StoreData::repack`].
    pub fn repack(&self, archetype: ArchetypeID) {
        unsafe { &mut *self.inner.get() }.repack(archetype)
    }

    /// Compacts every partition that currently holds holes.
    pub fn repack_all(&self) {
        let data = unsafe { &mut *self.inner.get() };
        for id in 0..data.partitions.len() as ArchetypeID {
            data.repack(id);
        }
    }

    /// Compacts partitions selected by the configured [`RepackPolicy`].
    /// Intended to run between ticks, never during iteration.
    pub fn maybe_repack(&self) {
        unsafe { &mut *self.inner.get() }.maybe_repack()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// A non-owning handle granting access to store data.
///
/// ## Role
/// `StoreRef` lets systems and query adapters read or mutate store state
/// while the `Store` itself stays shared.
///
/// ## Safety
/// Exposes raw access to `StoreData` via `UnsafeCell` and relies on
/// higher-level scheduling to prevent conflicting mutable access.
#[derive(Clone, Copy)]
pub struct StoreRef<'a> {
    inner: &'a UnsafeCell<StoreData>,
}

unsafe impl Send for StoreRef<'_> {}
unsafe impl Sync for StoreRef<'_> {}

impl<'a> StoreRef<'a> {
    /// Returns an immutable reference to store data.
    ///
    /// ## Safety
    /// No aliasing guarantees are enforced at compile time.
    #[inline]
    pub fn data(&self) -> &'a StoreData {
        unsafe { &*self.inner.get() }
    }

    /// Returns a mutable reference to store data.
    ///
    /// ## Safety
    /// The caller must ensure no conflicting references are active while
    /// this one is used; during ticks the scheduler's lock table provides
    /// that guarantee for component data.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn data_mut(&self) -> &'a mut StoreData {
        unsafe { &mut *self.inner.get() }
    }
}
