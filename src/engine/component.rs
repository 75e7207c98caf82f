//! Process-wide component registry.
//!
//! This module assigns stable [`ComponentID`] values to Rust component types
//! and exposes type-erased column factories for partition construction.
//!
//! ## Purpose
//! The registry decouples component type identity (`TypeId`, name, size,
//! alignment) from runtime storage, enabling partitions to allocate
//! heterogeneous component columns behind [`ColumnStorage`] without runtime
//! type switching on an open set of cases.
//!
//! ## Design
//! - Components are registered on first sight and assigned a compact
//!   `ComponentID` in `[0, COMPONENT_CAP)`.
//! - A per-component factory function is stored for constructing empty column
//!   storage.
//! - The table is process-wide, so multiple stores in one process agree on
//!   component identity and can be given disjoint entity id spaces.
//!
//! ## Invariants
//! - `ComponentID` values are unique and stable for the process lifetime;
//!   they are never reassigned.
//! - A registered component always has a corresponding storage factory.
//!
//! ## Concurrency
//! Lookup-or-insert is guarded by a single process-wide mutex, making
//! registration safe under concurrent first use from multiple stores.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    mem::{align_of, size_of},
    sync::{Mutex, OnceLock},
};

use crate::engine::error::ComponentCapacityError;
use crate::engine::storage::{Column, ColumnStorage};
use crate::engine::types::{ComponentID, COMPONENT_CAP};

/// Marker bound for component value types.
///
/// Components are plain data: cloned on row snapshots and migration, default
/// initialized when a row is allocated, and movable across scheduler threads.
pub trait Component: Any + Send + Sync + Clone + Default {}

impl<T: Any + Send + Sync + Clone + Default> Component for T {}

/// Factory constructing an empty type-erased column for one component type.
type ColumnFactory = fn() -> Box<dyn ColumnStorage>;

fn new_column<T: Component>() -> Box<dyn ColumnStorage> {
    Box::new(Column::<T>::default())
}

/// Describes a registered component type.
///
/// ## Purpose
/// Metadata for diagnostics, validation, and tooling. `ComponentDesc` is
/// `Copy` and safe to clone freely.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentID,
    /// Rust type name for diagnostics.
    pub name: &'static str,
    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,
    /// Size of the component type in bytes.
    pub size: usize,
    /// Alignment of the component type in bytes.
    pub align: usize,
}

impl std::fmt::Display for ComponentDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ComponentDesc {{ id: {}, name: {}, size: {}, align: {} }}",
            self.component_id, self.name, self.size, self.align
        )
    }
}

struct Registry {
    next_id: ComponentID,
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<Option<ComponentDesc>>,
    factories: Vec<Option<ColumnFactory>>,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| {
        Mutex::new(Registry {
            next_id: 0,
            by_type: HashMap::new(),
            by_id: vec![None; COMPONENT_CAP],
            factories: vec![None; COMPONENT_CAP],
        })
    })
}

impl Registry {
    /// Looks up `T`, registering it on first sight.
    ///
    /// ## Panics
    /// Panics if more distinct component types are registered than the mask
    /// width supports.
    fn register<T: Component>(&mut self) -> ComponentID {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }

        let id = self.next_id;
        if (id as usize) >= COMPONENT_CAP {
            panic!(
                "{}",
                ComponentCapacityError { requested: id as usize, capacity: COMPONENT_CAP }
            );
        }
        self.next_id = id + 1;

        self.by_type.insert(type_id, id);
        self.by_id[id as usize] = Some(ComponentDesc {
            component_id: id,
            name: type_name::<T>(),
            type_id,
            size: size_of::<T>(),
            align: align_of::<T>(),
        });
        self.factories[id as usize] = Some(new_column::<T>);
        id
    }
}

/// Returns the stable `ComponentID` for `T`, registering the type on first
/// sight.
///
/// ## Concurrency
/// Safe to call concurrently from multiple stores; lookup-or-insert runs
/// under one process-wide mutex.
///
/// ## Panics
/// Panics if the component capacity ([`COMPONENT_CAP`]) is exceeded.
pub fn register_component<T: Component>() -> ComponentID {
    registry().lock().unwrap().register::<T>()
}

/// Returns the `ComponentID` for `T`, if it has been registered.
pub fn component_id_of<T: Any>() -> Option<ComponentID> {
    registry().lock().unwrap().by_type.get(&TypeId::of::<T>()).copied()
}

/// Returns a copy of the descriptor for `component_id`, if registered.
pub fn component_description(component_id: ComponentID) -> Option<ComponentDesc> {
    registry()
        .lock()
        .unwrap()
        .by_id
        .get(component_id as usize)
        .and_then(|desc| *desc)
}

/// Returns the diagnostic type name for `component_id`, or `"?"` if the id
/// is unregistered.
pub fn component_name(component_id: ComponentID) -> &'static str {
    component_description(component_id).map(|desc| desc.name).unwrap_or("?")
}

/// Creates an empty type-erased column for `component_id`.
///
/// ## Purpose
/// Used by partition construction to allocate a column for every component
/// in a new archetype's mask.
///
/// ## Panics
/// Panics if no factory was registered for this component id — a partition
/// can only be created from a mask of registered components, so a missing
/// factory is an engine invariant violation.
pub fn make_empty_column(component_id: ComponentID) -> Box<dyn ColumnStorage> {
    let factory = registry()
        .lock()
        .unwrap()
        .factories
        .get(component_id as usize)
        .copied()
        .flatten()
        .unwrap_or_else(|| {
            panic!("no column factory registered for component id {component_id}")
        });
    factory()
}
