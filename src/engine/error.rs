//! Structured failure diagnostics for the storage engine and scheduler.
//!
//! This module declares focused, composable diagnostic types used across the
//! engine. Each type models a single failure mode and carries enough context
//! to make the failure actionable in a log line or a panic message.
//!
//! ## Goals
//! * **Specificity:** one type per failure mode (capacity exhaustion, ordering
//!   cycles, wrong-typed column access, system faults).
//! * **Ergonomics:** every type implements [`std::error::Error`] and
//!   [`fmt::Display`].
//! * **Actionability:** structured fields (requested vs. available capacity,
//!   offending indices, expected vs. actual type names) make diagnostics
//!   useful without reproducing the issue.
//!
//! ## Fatal vs. recoverable
//! The engine's failure taxonomy distinguishes three classes:
//!
//! * **Invariant violations and caller misuse** abort: the offending call
//!   panics with the rendered `Display` of one of these types. They indicate a
//!   bug in the engine or in the caller, never a condition to recover from.
//! * **Expected absence** (a component an entity doesn't have, a missing
//!   resource, a dead entity) is a normal two-valued result — `Option` or
//!   `bool` — and never passes through this module.
//! * **System execution faults** are caught at the per-system boundary and
//!   reported to error handlers as a [`SystemFault`]; sibling systems in the
//!   same tick are unaffected.

use std::fmt;

use crate::engine::types::{ArchetypeID, ComponentID, RowIndex};

/// Raised when registering more distinct component types than the mask width
/// supports.
///
/// ### Fields
/// * `requested` — the id the registration attempted to allocate.
/// * `capacity` — the fixed component capacity ([`crate::engine::types::COMPONENT_CAP`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentCapacityError {
    /// Component id the registration attempted to allocate.
    pub requested: usize,
    /// Fixed upper bound on distinct component types.
    pub capacity: usize,
}

impl fmt::Display for ComponentCapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "component type capacity exceeded (id {} requested; capacity {})",
            self.requested, self.capacity
        )
    }
}

impl std::error::Error for ComponentCapacityError {}

/// Raised when a column is accessed through the wrong element type.
///
/// ## Context
/// Column storage is type-erased; a downcast to the wrong `Column<T>` means
/// the registry's factory table and the access site disagree. That is an
/// engine invariant violation, not caller misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnTypeError {
    /// Component id whose column was accessed.
    pub component_id: ComponentID,
    /// Element type the access site expected.
    pub expected: &'static str,
    /// Element type the column actually stores.
    pub actual: &'static str,
}

impl fmt::Display for ColumnTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "column for component {} stores {} but was accessed as {}",
            self.component_id, self.actual, self.expected
        )
    }
}

impl std::error::Error for ColumnTypeError {}

/// Raised when a column write addresses a row more than one past the current
/// column length.
///
/// ## Context
/// A write at `row == length` appends; a write at `row < length` overwrites.
/// Anything beyond is a programming error in the engine — silently growing by
/// more than one slot would leave undefined rows between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBoundsError {
    /// Archetype whose column was addressed.
    pub archetype: ArchetypeID,
    /// Component id of the column.
    pub component_id: ComponentID,
    /// Offending row index.
    pub row: RowIndex,
    /// Column length at the time of the write.
    pub length: usize,
}

impl fmt::Display for RowBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "write at row {} is more than one past column length {} (component {}, archetype {})",
            self.row, self.length, self.component_id, self.archetype
        )
    }
}

impl std::error::Error for RowBoundsError {}

/// Raised when a scheduler group's before/after declarations form a cycle.
///
/// ### Fields
/// * `unresolved` — names of the systems that could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingCycleError {
    /// Systems left with unsatisfiable prerequisites.
    pub unresolved: Vec<String>,
}

impl fmt::Display for OrderingCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ordering constraints form a cycle among systems: {}",
            self.unresolved.join(", ")
        )
    }
}

impl std::error::Error for OrderingCycleError {}

/// Raised when a before/after declaration names a system that is not a member
/// of the group being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOrderingTargetError {
    /// System carrying the declaration.
    pub system: String,
    /// Name the declaration referred to.
    pub target: String,
}

impl fmt::Display for UnknownOrderingTargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "system '{}' declares an ordering constraint on unknown system '{}'",
            self.system, self.target
        )
    }
}

impl std::error::Error for UnknownOrderingTargetError {}

/// Raised when two systems in one group share a name.
///
/// Names are the handles ordering constraints refer to, so they must be
/// unique within a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSystemError {
    /// The colliding system name.
    pub name: String,
}

impl fmt::Display for DuplicateSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "duplicate system name '{}' in scheduler group", self.name)
    }
}

impl std::error::Error for DuplicateSystemError {}

/// A caught failure from one system's execution.
///
/// ## Purpose
/// When a system panics, the scheduler catches the unwind at that system's
/// boundary, packages the payload into a `SystemFault`, and hands it to every
/// registered error handler. The tick continues for sibling systems.
///
/// ### Fields
/// * `system` — name of the faulting system.
/// * `message` — panic payload rendered to a string.
/// * `backtrace` — backtrace captured at the catch site.
#[derive(Debug, Clone)]
pub struct SystemFault {
    /// Name of the faulting system.
    pub system: String,
    /// Panic payload rendered to a string.
    pub message: String,
    /// Captured backtrace, rendered.
    pub backtrace: String,
}

impl fmt::Display for SystemFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system '{}' faulted: {}", self.system, self.message)
    }
}

impl std::error::Error for SystemFault {}
