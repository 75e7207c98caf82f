//! Filtered queries with a generation-gated archetype cache.
//!
//! This module provides a *builder-style* API for constructing component
//! queries and executing them over matching archetype partitions.
//!
//! ## Filter shape
//!
//! Filters are fixed-shape component predicates:
//! * **required** — the partition must declare the component; iteration
//!   yields a mutable reference per row.
//! * **optional** — the partition is visited whether or not it declares the
//!   component; the caller probes per row (e.g. [`Store::read`]) and treats
//!   absence as `None`.
//! * **without** — partitions overlapping the combined exclusion mask are
//!   filtered out after the required-match list is computed.
//!
//! ## Caching policy
//!
//! A query caches its matching archetype id list together with the store
//! generation it was computed at. The generation increments only when a new
//! archetype is created, so on the common path (no new shapes since the
//! last tick) matching is O(cached list) rather than O(all archetypes).
//!
//! ## Execution model
//!
//! The fixed-arity adapters (`for_each1` .. `for_each6`) iterate partition
//! rows directly over column storage, skipping holes, with zero heap
//! allocation per entity. `par_for_each2` splits rows into fixed-size chunk
//! jobs and runs them on the rayon pool.
//!
//! ## Concurrency
//!
//! Adapters themselves take no locks; during ticks the scheduler's lock
//! table makes declared access race-free. Closures must not perform
//! structural mutations (spawn, migration-causing writes, repack) on the
//! store they are iterating; stage those on a [`CommandBuffer`] instead.
//! Lazy deletion ([`Store::delete`]) is the documented exception.
//!
//! [`Store::read`]: crate::engine::store::Store::read
//! [`Store::delete`]: crate::engine::store::Store::delete
//! [`CommandBuffer`]: crate::engine::commands::CommandBuffer

use rayon::prelude::*;

use crate::engine::component::{component_id_of, register_component, Component};
use crate::engine::store::{StoreData, StoreRef};
use crate::engine::types::{ArchetypeID, ComponentID, EntityID, Mask, INVALID_ENTITY};

/// Rows per parallel chunk job in `par_for_each2`.
const PAR_CHUNK_ROWS: usize = 4096;

/// Builder and cache for one filtered component query.
///
/// ## Example
/// ```ignore
/// let mut query = QueryBuilder::new()
///     .with::<Position>()
///     .with::<Velocity>()
///     .without::<Frozen>();
///
/// store.store_ref().for_each2::<Position, Velocity, _>(&mut query, |_, pos, vel| {
///     pos.x += vel.x;
/// });
/// ```
#[derive(Clone, Default)]
pub struct QueryBuilder {
    required: Vec<ComponentID>,
    required_mask: Mask,
    optional_mask: Mask,
    without_mask: Mask,
    cached: Vec<ArchetypeID>,
    cached_generation: Option<u64>,
}

impl QueryBuilder {
    /// Creates an empty query matching every archetype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires component `T` to be present in matching partitions.
    pub fn with<T: Component>(mut self) -> Self {
        let component_id = register_component::<T>();
        if !self.required_mask.has(component_id) {
            self.required_mask.set(component_id);
            self.required.push(component_id);
        }
        self.cached_generation = None;
        self
    }

    /// Declares component `T` optional: partitions are visited regardless of
    /// whether they declare it, and the caller probes for it per row.
    pub fn optional<T: Component>(mut self) -> Self {
        let component_id = register_component::<T>();
        self.optional_mask.set(component_id);
        // Optional wins over required: drop it from the required-match set
        // so its absence no longer excludes a partition.
        if self.required_mask.has(component_id) {
            self.required_mask.clear(component_id);
            self.required.retain(|&id| id != component_id);
        }
        self.cached_generation = None;
        self
    }

    /// Excludes partitions declaring component `T`.
    pub fn without<T: Component>(mut self) -> Self {
        let component_id = register_component::<T>();
        self.without_mask.set(component_id);
        self.cached_generation = None;
        self
    }

    /// Returns the required-match mask.
    #[inline]
    pub fn required_mask(&self) -> &Mask {
        &self.required_mask
    }

    /// Returns the combined exclusion mask.
    #[inline]
    pub fn without_mask(&self) -> &Mask {
        &self.without_mask
    }

    /// Returns the ordered list of archetypes currently satisfying this
    /// query, recomputing only when the store generation has moved past the
    /// cached one.
    pub fn archetypes(&mut self, data: &StoreData) -> &[ArchetypeID] {
        let generation = data.generation();
        if self.cached_generation != Some(generation) {
            self.cached.clear();
            let directory = data.directory();
            match self.required.first() {
                Some(&first) => {
                    for &id in directory.archetypes_with(first) {
                        if directory.mask_of(id).contains_all(&self.required_mask)
                            && !directory.overlaps(id, &self.without_mask)
                        {
                            self.cached.push(id);
                        }
                    }
                }
                None => {
                    for id in directory.ids() {
                        if !directory.overlaps(id, &self.without_mask) {
                            self.cached.push(id);
                        }
                    }
                }
            }
            self.cached_generation = Some(generation);
        }
        &self.cached
    }
}

fn assert_distinct(ids: &[ComponentID]) {
    for (index, id) in ids.iter().enumerate() {
        assert!(
            !ids[..index].contains(id),
            "duplicate component type in query adapter (component id {id})"
        );
    }
}

/// One row range of one partition, packaged for parallel execution.
///
/// ## Safety
/// Pointers originate from live column storage and stay valid for the
/// duration of the parallel call; jobs cover pairwise disjoint row ranges,
/// so mutable accesses never overlap.
#[derive(Clone, Copy)]
struct RowJob<A, B> {
    start: usize,
    length: usize,
    entities: *const EntityID,
    a: *mut A,
    b: *mut B,
}

unsafe impl<A, B> Send for RowJob<A, B> {}
unsafe impl<A, B> Sync for RowJob<A, B> {}

macro_rules! for_each_adapters {
    ($($method:ident => ($($T:ident / $ptr:ident),+));+ $(;)?) => {
        impl<'w> StoreRef<'w> {
            $(
                /// Executes the query serially, invoking `f` with the entity
                /// id and a mutable reference to each required component at
                /// every live row of every matching partition. Holes are
                /// skipped.
                ///
                /// ## Panics
                /// Panics if a component type is not in the query's required
                /// set, or appears twice; both are caller misuse.
                pub fn $method<$($T: Component,)+ Func>(
                    &self,
                    query: &mut QueryBuilder,
                    mut f: Func,
                ) where
                    Func: FnMut(EntityID, $(&mut $T),+),
                {
                    let ids = [$(component_id_of::<$T>()
                        .expect("query adapter component type was never registered")),+];
                    assert_distinct(&ids);
                    for id in ids {
                        assert!(
                            query.required_mask().has(id),
                            "component id {id} is not in the query's required set"
                        );
                    }

                    let archetypes = query.archetypes(self.data()).to_vec();
                    for archetype in archetypes {
                        let (entities, row_count) = {
                            let partition = self.data().partition(archetype);
                            (partition.entities().as_ptr(), partition.row_count())
                        };
                        if row_count == 0 {
                            continue;
                        }
                        $(
                            let $ptr = {
                                let id = component_id_of::<$T>().unwrap();
                                self.data_mut()
                                    .tables_mut()
                                    .typed_mut::<$T>(id, archetype)
                                    .unwrap_or_else(|| panic!(
                                        "matched archetype {archetype} lacks a column for component {id}"
                                    ))
                                    .as_mut_ptr()
                            };
                        )+
                        for row in 0..row_count {
                            let entity = unsafe { *entities.add(row) };
                            if entity == INVALID_ENTITY {
                                continue;
                            }
                            unsafe { f(entity, $(&mut *$ptr.add(row)),+) };
                        }
                    }
                }
            )+
        }
    };
}

for_each_adapters! {
    for_each1 => (A / a_column);
    for_each2 => (A / a_column, B / b_column);
    for_each3 => (A / a_column, B / b_column, C / c_column);
    for_each4 => (A / a_column, B / b_column, C / c_column, D / d_column);
    for_each5 => (A / a_column, B / b_column, C / c_column, D / d_column, E / e_column);
    for_each6 => (A / a_column, B / b_column, C / c_column, D / d_column, E / e_column, F / f_column);
}

impl<'w> StoreRef<'w> {
    /// Counts the live entities in every partition matching the query.
    pub fn count(&self, query: &mut QueryBuilder) -> usize {
        let archetypes = query.archetypes(self.data()).to_vec();
        archetypes
            .into_iter()
            .map(|archetype| self.data().partition(archetype).live_count())
            .sum()
    }

    /// Executes the query over two required components in parallel: rows are
    /// split into fixed-size chunk jobs and processed on the rayon pool.
    ///
    /// `f` must be pure with respect to store structure: no spawns, no
    /// migration-causing writes, no deletes; stage those on a command
    /// buffer and apply them after iteration.
    ///
    /// ## Panics
    /// As the serial adapters, plus any panic raised inside `f` propagates
    /// after the parallel call completes.
    pub fn par_for_each2<A: Component, B: Component, F>(&self, query: &mut QueryBuilder, f: F)
    where
        F: Fn(EntityID, &mut A, &mut B) + Send + Sync,
    {
        let a_id = component_id_of::<A>()
            .expect("query adapter component type was never registered");
        let b_id = component_id_of::<B>()
            .expect("query adapter component type was never registered");
        assert_distinct(&[a_id, b_id]);
        for id in [a_id, b_id] {
            assert!(
                query.required_mask().has(id),
                "component id {id} is not in the query's required set"
            );
        }

        let archetypes = query.archetypes(self.data()).to_vec();
        let mut jobs: Vec<RowJob<A, B>> = Vec::new();
        for archetype in archetypes {
            let (entities, row_count) = {
                let partition = self.data().partition(archetype);
                (partition.entities().as_ptr(), partition.row_count())
            };
            if row_count == 0 {
                continue;
            }
            let a = self
                .data_mut()
                .tables_mut()
                .typed_mut::<A>(a_id, archetype)
                .unwrap_or_else(|| {
                    panic!("matched archetype {archetype} lacks a column for component {a_id}")
                })
                .as_mut_ptr();
            let b = self
                .data_mut()
                .tables_mut()
                .typed_mut::<B>(b_id, archetype)
                .unwrap_or_else(|| {
                    panic!("matched archetype {archetype} lacks a column for component {b_id}")
                })
                .as_mut_ptr();

            let mut start = 0;
            while start < row_count {
                let length = PAR_CHUNK_ROWS.min(row_count - start);
                jobs.push(RowJob { start, length, entities, a, b });
                start += length;
            }
        }

        jobs.par_iter().for_each(|job| {
            for offset in 0..job.length {
                let row = job.start + offset;
                let entity = unsafe { *job.entities.add(row) };
                if entity == INVALID_ENTITY {
                    continue;
                }
                unsafe { f(entity, &mut *job.a.add(row), &mut *job.b.add(row)) };
            }
        });
    }
}
