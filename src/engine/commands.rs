//! Deferred, entity-scoped mutation staging.
//!
//! ## Purpose
//! A [`CommandBuffer`] records structural mutations (entity spawns and
//! component writes) as plain data instead of applying them immediately.
//! Staged commands are applied against the store in enqueue order by
//! [`CommandBuffer::execute`], giving callers an atomic application point:
//! typically the synchronization gap between scheduler ticks.
//!
//! ## Design
//! - Each command stages its component values into a per-entity accumulator
//!   (a [`Bundle`]: per-component is-set flag plus boxed value) drawn from a
//!   reusable pool, so steady-state staging does not allocate per command.
//! - Spawns allocate the real entity id at stage time from the store's
//!   atomic allocator, so callers receive a usable pending id immediately;
//!   the entity gains a location when the buffer is executed.
//! - [`CommandBuffer::cancel`] retroactively turns a staged command into a
//!   no-op without removing its slot, keeping queue indices stable for
//!   callers holding a handle.
//!
//! ## Invariants
//! - Commands are applied in exactly the order they were staged.
//! - After `execute`, the queue is empty and every accumulator is back at
//!   the head of the pool free list.
//!
//! ## Concurrency
//! A command buffer is **not** safe for simultaneous staging from multiple
//! callers without external synchronization; the intended ownership is one
//! buffer per scheduler tick.

use std::mem;

use crate::engine::component::{register_component, Component};
use crate::engine::store::Store;
use crate::engine::types::{Bundle, EntityID, INVALID_ENTITY};

enum CommandKind {
    /// Create the target entity's first location from the staged values.
    Spawn,
    /// Apply the staged values to an existing entity.
    Write,
}

struct StagedCommand {
    kind: CommandKind,
    entity: EntityID,
    accumulator: usize,
    cancelled: bool,
}

/// FIFO queue of staged entity mutations with a pooled accumulator arena.
pub struct CommandBuffer {
    commands: Vec<StagedCommand>,
    accumulators: Vec<Bundle>,
    free: Vec<usize>,
}

impl CommandBuffer {
    /// Creates an empty command buffer.
    pub fn new() -> Self {
        Self { commands: Vec::new(), accumulators: Vec::new(), free: Vec::new() }
    }

    /// Returns the number of staged commands, cancelled ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Pops an accumulator from the pool free list, or grows the pool.
    fn take_accumulator(&mut self) -> usize {
        match self.free.pop() {
            Some(index) => index,
            None => {
                self.accumulators.push(Bundle::new());
                self.accumulators.len() - 1
            }
        }
    }

    /// Stages a spawn. The returned handle carries the pre-allocated entity
    /// id; values are attached with [`PendingCommand::insert`].
    pub fn spawn_empty<'a>(&'a mut self, store: &Store) -> PendingCommand<'a> {
        let entity = store.new_entity();
        let accumulator = self.take_accumulator();
        let index = self.commands.len();
        self.commands.push(StagedCommand {
            kind: CommandKind::Spawn,
            entity,
            accumulator,
            cancelled: false,
        });
        PendingCommand { buffer: self, index }
    }

    /// Stages a write against an existing entity id.
    ///
    /// ## Panics
    /// Panics if `entity` is the reserved invalid id: staging a write to
    /// the sentinel is caller misuse, reported at the staging site rather
    /// than at flush time.
    pub fn write(&mut self, entity: EntityID) -> PendingCommand<'_> {
        assert!(
            entity != INVALID_ENTITY,
            "staged write addressed to the reserved invalid entity id"
        );
        let accumulator = self.take_accumulator();
        let index = self.commands.len();
        self.commands.push(StagedCommand {
            kind: CommandKind::Write,
            entity,
            accumulator,
            cancelled: false,
        });
        PendingCommand { buffer: self, index }
    }

    /// Retroactively turns the command at `index` into a no-op. The slot is
    /// kept so indices held by other callers stay valid.
    pub fn cancel(&mut self, index: usize) {
        self.commands[index].cancelled = true;
    }

    /// Returns the pending entity id of the command at `index`.
    pub fn entity_of(&self, index: usize) -> EntityID {
        self.commands[index].entity
    }

    /// Applies every staged command against `store` in enqueue order, then
    /// clears the queue and returns all accumulators to the head of the
    /// pool free list.
    pub fn execute(&mut self, store: &Store) {
        let data = store.store_ref().data_mut();
        let commands = mem::take(&mut self.commands);
        for command in &commands {
            if command.cancelled {
                self.accumulators[command.accumulator].clear();
                continue;
            }
            log::trace!(
                "applying {} for entity {}",
                match command.kind {
                    CommandKind::Spawn => "spawn",
                    CommandKind::Write => "write",
                },
                command.entity
            );
            // A spawn with no staged values allocates no location; the
            // pending id simply stays absent.
            data.apply_bundle(command.entity, &mut self.accumulators[command.accumulator]);
        }
        for command in commands.iter().rev() {
            self.free.push(command.accumulator);
        }
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one staged command, used to attach values or cancel it.
pub struct PendingCommand<'a> {
    buffer: &'a mut CommandBuffer,
    index: usize,
}

impl<'a> PendingCommand<'a> {
    /// Returns the target entity id. For spawns this is the pre-allocated
    /// pending id, valid for later `write` staging even before execution.
    #[inline]
    pub fn entity(&self) -> EntityID {
        self.buffer.commands[self.index].entity
    }

    /// Returns the queue index, usable with [`CommandBuffer::cancel`].
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stages a component value on this command, replacing any previously
    /// staged value of the same type.
    pub fn insert<T: Component>(self, value: T) -> Self {
        let component_id = register_component::<T>();
        let accumulator = self.buffer.commands[self.index].accumulator;
        self.buffer.accumulators[accumulator].insert(component_id, value);
        self
    }

    /// Cancels this command in place.
    pub fn cancel(self) {
        let index = self.index;
        self.buffer.cancel(index);
    }
}
