//! # simcore
//!
//! In-process, data-oriented storage engine and concurrent task scheduler
//! for simulation runtimes.
//!
//! Entities hold an open set of typed component values and are grouped
//! automatically into dense, homogeneous archetype partitions that change
//! membership as components are added or removed. On top of the storage
//! engine sit a deferred command buffer, a generation-gated filtered query
//! cache, and a scheduler that executes independent systems in parallel
//! within a tick, driven by declared read/write sets and explicit ordering
//! constraints.
//!
//! ## Design Goals
//! - Archetype-based columnar storage for cache efficiency
//! - Lazy, iteration-safe deletion with explicit opt-in repacking
//! - Safe parallel execution from declared data access
//! - Expected absence as data (`Option`), fatal aborts only for invariant
//!   violations and misuse

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::store::{
    RepackPolicy,
    Store,
    StoreConfig,
    StoreData,
    StoreRef,
};

pub use engine::component::{
    component_description,
    component_id_of,
    register_component,
    Component,
    ComponentDesc,
};

pub use engine::commands::{CommandBuffer, PendingCommand};

pub use engine::query::QueryBuilder;

pub use engine::systems::{FnSystem, System};

pub use engine::scheduler::{
    GroupPhase,
    SystemGroup,
    SystemTiming,
    TickStats,
    TimeStep,
};

pub use engine::error::SystemFault;

pub use engine::types::{
    AccessSets,
    ArchetypeID,
    Bundle,
    ComponentID,
    EntityID,
    Mask,
    RowIndex,
    Tick,
    INVALID_ENTITY,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use simcore::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        register_component,
        AccessSets,
        Bundle,
        CommandBuffer,
        Component,
        EntityID,
        FnSystem,
        QueryBuilder,
        Store,
        StoreConfig,
        StoreRef,
        System,
        SystemGroup,
    };
}
