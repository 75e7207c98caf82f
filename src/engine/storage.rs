//! Columnar component storage and type-erased column access.
//!
//! This module implements the dense column storage backing archetype
//! partitions: one [`Column<T>`] per (component type, archetype) pair, held
//! behind the type-erased [`ColumnStorage`] trait and addressed through
//! [`ComponentTables`].
//!
//! # Storage model
//!
//! A column is a plain dense `Vec<T>`. Row `i` of every column an archetype
//! declares belongs to the entity at row `i` of that archetype's partition
//! record. Deletion never removes rows — the partition marks the row a hole
//! and a later allocation in the same archetype reuses it — so columns only
//! grow by appends and only shrink during an explicit repack.
//!
//! # Write semantics
//!
//! A column write at `row == len` appends; at `row < len` it overwrites in
//! place. A write more than one past the end is rejected fatally: silently
//! growing by more than one slot would leave undefined rows between, which is
//! exactly the kind of silent corruption the engine forbids.
//!
//! # Type erasure
//!
//! [`ColumnStorage`] is the single, closed erasure seam for columns. It
//! provides structure queries, default-fill and boxed-value mutation used by
//! structural operations (allocation, migration, command flush), and
//! repack support (`swap_rows` / `truncate`). Hot iteration paths never go
//! through it — they downcast once per archetype to `Column<T>` and then
//! work on slices.

use std::any::{type_name, Any};

use crate::engine::component::make_empty_column;
use crate::engine::error::{ColumnTypeError, RowBoundsError};
use crate::engine::intmap::IntMap;
use crate::engine::types::{ArchetypeID, ComponentID, RowIndex};

/// Type-erased interface over one dense component column.
///
/// ## Invariants
/// - `len()` equals the number of initialized rows.
/// - Every row below `len()` holds a defined value.
/// - The concrete element type never changes after construction.
pub trait ColumnStorage: Any + Send + Sync {
    /// Returns the number of rows stored.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the human-readable element type name.
    fn element_type_name(&self) -> &'static str;

    /// Returns an immutable type-erased reference for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable type-erased reference for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Appends one default-initialized row.
    fn push_default(&mut self);

    /// Overwrites the row at `row` with the element default.
    ///
    /// ## Panics
    /// Panics if `row` is out of bounds; allocation only default-fills rows
    /// that already exist (hole reuse), so an out-of-bounds row here is an
    /// engine invariant violation.
    fn write_default(&mut self, row: usize);

    /// Writes a boxed value at `row`: appends iff `row == len`, overwrites
    /// iff `row < len`.
    ///
    /// ## Panics
    /// Panics if the boxed value's type does not match the element type, or
    /// if `row > len` (both engine invariant violations; callers bound-check
    /// with diagnostic context first).
    fn write_boxed(&mut self, row: usize, value: Box<dyn Any + Send>);

    /// Returns a boxed clone of the value at `row`.
    ///
    /// ## Panics
    /// Panics if `row` is out of bounds.
    fn read_boxed(&self, row: usize) -> Box<dyn Any + Send>;

    /// Swaps the values at two rows. Used by repack to move the last live
    /// row into a hole.
    fn swap_rows(&mut self, a: usize, b: usize);

    /// Shrinks the column to `len` rows. Used by repack after swapping
    /// holes to the tail.
    fn truncate(&mut self, len: usize);
}

/// Dense column of component values for one (component, archetype) pair.
pub struct Column<T> {
    values: Vec<T>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T> Column<T> {
    /// Returns the value at `row`, if in bounds.
    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row)
    }

    /// Returns the value at `row` mutably, if in bounds.
    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.values.get_mut(row)
    }

    /// Returns all rows as a slice.
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Returns all rows as a mutable slice.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Returns a raw pointer to row 0, for chunked parallel iteration.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.values.as_mut_ptr()
    }
}

impl<T: Any + Send + Sync + Clone + Default> ColumnStorage for Column<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn push_default(&mut self) {
        self.values.push(T::default());
    }

    fn write_default(&mut self, row: usize) {
        self.values[row] = T::default();
    }

    fn write_boxed(&mut self, row: usize, value: Box<dyn Any + Send>) {
        let value = value.downcast::<T>().unwrap_or_else(|_| {
            panic!("boxed value does not match column element type {}", type_name::<T>())
        });
        if row == self.values.len() {
            self.values.push(*value);
        } else {
            self.values[row] = *value;
        }
    }

    fn read_boxed(&self, row: usize) -> Box<dyn Any + Send> {
        Box::new(self.values[row].clone())
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        self.values.swap(a, b);
    }

    fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }
}

/// Per-component column tables keyed by archetype id.
///
/// ## Purpose
/// The storage engine's column index: `tables[component_id]` maps an
/// archetype id to the dense column holding that component for that
/// partition. Both lookups are hot, so the inner map is the specialized
/// [`IntMap`] rather than a generic hash map.
///
/// ## Invariants
/// - A column exists for (c, a) iff archetype `a`'s mask contains `c`.
/// - Column length always equals the owning partition's row-list length.
#[derive(Default)]
pub struct ComponentTables {
    tables: Vec<IntMap<Box<dyn ColumnStorage>>>,
}

impl ComponentTables {
    /// Creates an empty table set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materializes an empty column for `(component_id, archetype)` if one
    /// does not exist yet. Called once per component when a partition is
    /// created.
    pub fn ensure_column(&mut self, component_id: ComponentID, archetype: ArchetypeID) {
        let index = component_id as usize;
        while self.tables.len() <= index {
            self.tables.push(IntMap::new());
        }
        if !self.tables[index].contains(archetype as u64) {
            self.tables[index].put(archetype as u64, make_empty_column(component_id));
        }
    }

    /// Returns the column for `(component_id, archetype)`, if one exists.
    #[inline]
    pub fn column(
        &self,
        component_id: ComponentID,
        archetype: ArchetypeID,
    ) -> Option<&dyn ColumnStorage> {
        self.tables
            .get(component_id as usize)?
            .get(archetype as u64)
            .map(|column| column.as_ref())
    }

    /// Returns the column for `(component_id, archetype)` mutably, if one
    /// exists.
    #[inline]
    pub fn column_mut(
        &mut self,
        component_id: ComponentID,
        archetype: ArchetypeID,
    ) -> Option<&mut Box<dyn ColumnStorage>> {
        self.tables.get_mut(component_id as usize)?.get_mut(archetype as u64)
    }

    /// Returns the typed column for `(component_id, archetype)`, if one
    /// exists.
    ///
    /// ## Panics
    /// Panics if the column exists but stores a different element type — the
    /// registry and the access site disagreeing is an engine invariant
    /// violation, not an absence.
    pub fn typed<T: 'static>(
        &self,
        component_id: ComponentID,
        archetype: ArchetypeID,
    ) -> Option<&Column<T>> {
        let column = self.column(component_id, archetype)?;
        let actual = column.element_type_name();
        Some(column.as_any().downcast_ref::<Column<T>>().unwrap_or_else(|| {
            panic!(
                "{}",
                ColumnTypeError { component_id, expected: type_name::<T>(), actual }
            )
        }))
    }

    /// Returns the typed column for `(component_id, archetype)` mutably, if
    /// one exists.
    ///
    /// ## Panics
    /// As [`ComponentTables::typed`].
    pub fn typed_mut<T: 'static>(
        &mut self,
        component_id: ComponentID,
        archetype: ArchetypeID,
    ) -> Option<&mut Column<T>> {
        let column = self.column_mut(component_id, archetype)?;
        let actual = column.element_type_name();
        Some(column.as_any_mut().downcast_mut::<Column<T>>().unwrap_or_else(|| {
            panic!(
                "{}",
                ColumnTypeError { component_id, expected: type_name::<T>(), actual }
            )
        }))
    }

    /// Writes a typed value at `row` in the column for
    /// `(component_id, archetype)`: appends iff `row` equals the column
    /// length, overwrites in place otherwise.
    ///
    /// ## Panics
    /// Panics with a [`RowBoundsError`] if `row` is more than one past the
    /// current column length, and if the column does not exist or stores a
    /// different element type (engine invariant violations).
    pub fn write_value<T: 'static>(
        &mut self,
        component_id: ComponentID,
        archetype: ArchetypeID,
        row: RowIndex,
        value: T,
    ) {
        self.check_write_bounds(component_id, archetype, row);
        let column = self.typed_mut::<T>(component_id, archetype).unwrap_or_else(|| {
            panic!("no column for component {component_id} in archetype {archetype}")
        });
        let row = row as usize;
        if row == column.values.len() {
            column.values.push(value);
        } else {
            column.values[row] = value;
        }
    }

    /// Writes a boxed value at `row` with the same append-or-overwrite
    /// semantics as [`ComponentTables::write_value`].
    pub fn write_boxed(
        &mut self,
        component_id: ComponentID,
        archetype: ArchetypeID,
        row: RowIndex,
        value: Box<dyn Any + Send>,
    ) {
        self.check_write_bounds(component_id, archetype, row);
        let column = self.column_mut(component_id, archetype).unwrap_or_else(|| {
            panic!("no column for component {component_id} in archetype {archetype}")
        });
        column.write_boxed(row as usize, value);
    }

    /// Returns a boxed clone of the value at `row`, or `None` if the
    /// archetype does not declare the component.
    pub fn read_boxed(
        &self,
        component_id: ComponentID,
        archetype: ArchetypeID,
        row: RowIndex,
    ) -> Option<Box<dyn Any + Send>> {
        Some(self.column(component_id, archetype)?.read_boxed(row as usize))
    }

    fn check_write_bounds(&self, component_id: ComponentID, archetype: ArchetypeID, row: RowIndex) {
        if let Some(column) = self.column(component_id, archetype) {
            let length = column.len();
            if (row as usize) > length {
                panic!("{}", RowBoundsError { archetype, component_id, row, length });
            }
        }
    }
}
