//! System abstractions for the scheduler.
//!
//! A **system** is one schedulable unit of per-tick work with declared data
//! dependencies and ordering constraints. Systems:
//!
//! - declare which components they read and write (or decline to, accepting
//!   the conservative whole-store-exclusive default),
//! - declare explicit run-after / run-before constraints by system name,
//! - operate through a [`StoreRef`] rather than direct world access,
//! - are run-to-completion: a system never suspends mid-execution.
//!
//! ## Scheduling model
//!
//! The scheduler derives two things from these declarations: a prerequisite
//! graph from the ordering constraints, and a component lock plan from the
//! access sets. Systems with non-conflicting access and no ordering edge
//! between them may run in parallel within a tick.
//!
//! ## Function-backed systems
//!
//! [`FnSystem`] defines a system from a closure plus builder-style
//! declarations, avoiding a bespoke type per system. This is the intended
//! mechanism for most simulation logic.

use crate::engine::component::{register_component, Component};
use crate::engine::store::StoreRef;
use crate::engine::types::AccessSets;

/// A unit of executable logic operating on the store.
///
/// Systems must be `Send + Sync` so they can be scheduled across worker
/// threads.
pub trait System: Send + Sync {
    /// Returns the unique (within a group) name of this system. Ordering
    /// constraints refer to systems by this name.
    fn name(&self) -> &str;

    /// Returns the component access sets declared by this system, or `None`
    /// to accept the conservative default: exclusive access to every
    /// component (whole-store lock).
    fn access(&self) -> Option<AccessSets> {
        None
    }

    /// Names of systems this one must start strictly after.
    fn run_after(&self) -> &[&str] {
        &[]
    }

    /// Names of systems this one must complete strictly before.
    fn run_before(&self) -> &[&str] {
        &[]
    }

    /// Executes the system logic against the store.
    fn run(&self, store: StoreRef<'_>);
}

/// A concrete [`System`] backed by a function or closure.
pub struct FnSystem<F>
where
    F: Fn(StoreRef<'_>) + Send + Sync + 'static,
{
    name: &'static str,
    access: Option<AccessSets>,
    after: Vec<&'static str>,
    before: Vec<&'static str>,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(StoreRef<'_>) + Send + Sync + 'static,
{
    /// Creates a function-backed system with no declared access (the
    /// scheduler treats it as whole-store exclusive until access is
    /// declared) and no ordering constraints.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, access: None, after: Vec::new(), before: Vec::new(), f }
    }

    /// Declares read access to component `T`, registering the type on first
    /// sight.
    pub fn reads<T: Component>(mut self) -> Self {
        let component_id = register_component::<T>();
        self.access.get_or_insert_with(AccessSets::default).read.set(component_id);
        self
    }

    /// Declares write access to component `T`, registering the type on
    /// first sight.
    pub fn writes<T: Component>(mut self) -> Self {
        let component_id = register_component::<T>();
        self.access.get_or_insert_with(AccessSets::default).write.set(component_id);
        self
    }

    /// Replaces the declared access sets wholesale.
    pub fn with_access(mut self, access: AccessSets) -> Self {
        self.access = Some(access);
        self
    }

    /// Declares that this system starts strictly after `other` completes.
    pub fn after(mut self, other: &'static str) -> Self {
        self.after.push(other);
        self
    }

    /// Declares that this system completes strictly before `other` starts.
    pub fn before(mut self, other: &'static str) -> Self {
        self.before.push(other);
        self
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(StoreRef<'_>) + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn access(&self) -> Option<AccessSets> {
        self.access.clone()
    }

    fn run_after(&self) -> &[&str] {
        &self.after
    }

    fn run_before(&self) -> &[&str] {
        &self.before
    }

    fn run(&self, store: StoreRef<'_>) {
        (self.f)(store)
    }
}
