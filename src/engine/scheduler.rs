//! Dependency-aware concurrent system scheduling.
//!
//! A [`SystemGroup`] owns a fixed set of systems and executes them once per
//! tick, in parallel where their declarations allow it.
//!
//! ## Build step
//!
//! [`SystemGroup::build`] derives, for the group's systems:
//!
//! * an **ordering graph** from explicit run-after / run-before
//!   declarations, converted into a prerequisite count and a release list
//!   per system (cycles and unknown names abort with a descriptive
//!   message);
//! * a **lock table** mapping each declared-read or declared-written
//!   component id to one shared/exclusive lock, plus a store-wide lock that
//!   implements the pure-exclusive fallback for systems declaring no access
//!   sets (conservative: such a system excludes every other system).
//!
//! ## Tick execution
//!
//! Each tick runs every system exactly once as an independently schedulable
//! unit of work (one scoped thread per system). A unit:
//!
//! 1. blocks until its prerequisite count reaches zero,
//! 2. acquires its declared locks in a fixed global order (store lock
//!    first, then component locks ascending by id) to prevent deadlock
//!    between systems with overlapping but differently-ordered needs,
//! 3. executes, run-to-completion,
//! 4. releases its locks and decrements its dependents' prerequisite
//!    counters.
//!
//! The tick is complete when every system has executed; after-tick hooks
//! then run and per-system timings (wait-for-order, wait-for-lock,
//! execution, and the execution window stamps) are recorded, bounded to the
//! most recent N ticks.
//!
//! ## Failure semantics
//!
//! A panic inside one system is caught at that system's boundary, reported
//! to registered error handlers as a [`SystemFault`], and does not abort
//! sibling systems already running in the same tick.
//!
//! ## Drivers
//!
//! [`SystemGroup::run_fixed`] waits out the remainder of the configured
//! interval between ticks; [`SystemGroup::run_realtime`] runs ticks
//! back-to-back; [`SystemGroup::run_step`] executes one explicitly numbered
//! tick. Drivers observe the cooperative stop signal between ticks; a
//! started tick always runs to completion.

use std::backtrace::Backtrace;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::error::{
    DuplicateSystemError, OrderingCycleError, SystemFault, UnknownOrderingTargetError,
};
use crate::engine::store::Store;
use crate::engine::systems::System;
use crate::engine::types::{ComponentID, Tick};

/// Default number of recent ticks retained by the statistics ring.
pub const DEFAULT_STATS_WINDOW: usize = 64;

/// Per-tick time step resource, refreshed by the drivers before every tick.
///
/// Systems obtain it with `store.get_resource::<TimeStep>()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeStep {
    /// Seconds covered by this tick: the configured interval for the fixed
    /// driver, the measured previous-tick duration for the realtime driver,
    /// zero for explicit stepping.
    pub delta: f64,
    /// The tick number being executed.
    pub tick: Tick,
}

/// Lifecycle phase of a group, `idle → resolved → running → drained → idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupPhase {
    /// No build has run, or the system set changed since the last build.
    Idle,
    /// Ordering and locks are resolved; the group is ready to tick.
    Resolved,
    /// A tick is executing.
    Running,
    /// All systems of the current tick have completed; bookkeeping pending.
    Drained,
}

const PHASE_IDLE: u8 = 0;
const PHASE_RESOLVED: u8 = 1;
const PHASE_RUNNING: u8 = 2;
const PHASE_DRAINED: u8 = 3;

#[derive(Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Ordering and locking derived at build time.
struct Plan {
    /// Initial prerequisite count per system.
    prerequisites: Vec<usize>,
    /// Systems to unblock when a system completes.
    release: Vec<Vec<usize>>,
    /// Component ids backing the lock table, ascending.
    lock_components: Vec<ComponentID>,
    /// One lock per entry of `lock_components`.
    locks: Vec<RwLock<()>>,
    /// Store-wide lock: shared for declared systems, exclusive fallback for
    /// undeclared ones.
    store_lock: RwLock<()>,
    /// Per system: store-lock mode, then `(lock index, mode)` ascending.
    lock_plans: Vec<(LockMode, Vec<(usize, LockMode)>)>,
}

enum LockGuard<'a> {
    Shared(RwLockReadGuard<'a, ()>),
    Exclusive(RwLockWriteGuard<'a, ()>),
}

/// Prerequisite gate: a counter a unit blocks on until it reaches zero.
struct Gate {
    remaining: Mutex<usize>,
    signal: Condvar,
}

impl Gate {
    fn new(count: usize) -> Self {
        Self { remaining: Mutex::new(count), signal: Condvar::new() }
    }

    fn wait(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        while *remaining > 0 {
            remaining = self.signal.wait(remaining).unwrap();
        }
    }

    fn arrive(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        *remaining -= 1;
        if *remaining == 0 {
            self.signal.notify_all();
        }
    }
}

/// Timing record for one system in one tick.
#[derive(Clone, Debug)]
pub struct SystemTiming {
    /// System name.
    pub name: String,
    /// Time spent blocked on the prerequisite gate.
    pub wait_order: Duration,
    /// Time spent acquiring the declared locks.
    pub wait_lock: Duration,
    /// Execution duration.
    pub exec: Duration,
    /// Instant execution began (locks held).
    pub started: Instant,
    /// Instant execution finished (before lock release).
    pub ended: Instant,
}

/// Timing record for one tick.
#[derive(Clone, Debug)]
pub struct TickStats {
    /// Tick number.
    pub tick: Tick,
    /// Wall-clock duration of the whole tick.
    pub total: Duration,
    /// Per-system timings, in system registration order.
    pub systems: Vec<SystemTiming>,
}

/// A fixed set of systems executed together, once per tick.
pub struct SystemGroup {
    systems: Vec<Box<dyn System>>,
    plan: Option<Plan>,
    on_start: Vec<Box<dyn Fn() + Send + Sync>>,
    on_stop: Vec<Box<dyn Fn() + Send + Sync>>,
    on_error: Vec<Box<dyn Fn(&SystemFault) + Send + Sync>>,
    after_tick: Vec<Box<dyn Fn() + Send + Sync>>,
    stats: Mutex<VecDeque<TickStats>>,
    stats_window: usize,
    stop: AtomicBool,
    next_tick: AtomicU64,
    phase: AtomicU8,
}

impl SystemGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            plan: None,
            on_start: Vec::new(),
            on_stop: Vec::new(),
            on_error: Vec::new(),
            after_tick: Vec::new(),
            stats: Mutex::new(VecDeque::new()),
            stats_window: DEFAULT_STATS_WINDOW,
            stop: AtomicBool::new(false),
            next_tick: AtomicU64::new(0),
            phase: AtomicU8::new(PHASE_IDLE),
        }
    }

    /// Sets how many recent ticks the statistics ring retains.
    pub fn with_stats_window(mut self, window: usize) -> Self {
        self.stats_window = window.max(1);
        self
    }

    /// Adds a system to the group. Invalidates any previous build.
    pub fn add_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
        self.plan = None;
        self.phase.store(PHASE_IDLE, Ordering::Relaxed);
    }

    /// Registers a handler invoked when a driver starts.
    pub fn on_start(&mut self, handler: impl Fn() + Send + Sync + 'static) {
        self.on_start.push(Box::new(handler));
    }

    /// Registers a handler invoked when a driver observes the stop signal.
    pub fn on_stop(&mut self, handler: impl Fn() + Send + Sync + 'static) {
        self.on_stop.push(Box::new(handler));
    }

    /// Registers a handler invoked with every caught [`SystemFault`].
    pub fn on_error(&mut self, handler: impl Fn(&SystemFault) + Send + Sync + 'static) {
        self.on_error.push(Box::new(handler));
    }

    /// Registers a hook invoked after every completed tick, before timing
    /// statistics are recorded. The intended place for between-tick work
    /// such as command-buffer flushes or `store.maybe_repack()`.
    pub fn on_tick_complete(&mut self, handler: impl Fn() + Send + Sync + 'static) {
        self.after_tick.push(Box::new(handler));
    }

    /// Returns the group's current lifecycle phase.
    pub fn phase(&self) -> GroupPhase {
        match self.phase.load(Ordering::Relaxed) {
            PHASE_RESOLVED => GroupPhase::Resolved,
            PHASE_RUNNING => GroupPhase::Running,
            PHASE_DRAINED => GroupPhase::Drained,
            _ => GroupPhase::Idle,
        }
    }

    /// Requests cooperative shutdown: drivers observe the signal between
    /// ticks; a started tick always completes.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Returns a copy of the retained tick statistics, oldest first.
    pub fn statistics(&self) -> Vec<TickStats> {
        self.stats.lock().unwrap().iter().cloned().collect()
    }

    /// Resolves ordering and locking for the current system set.
    ///
    /// ## Panics
    /// Panics on duplicate system names, on ordering constraints that name
    /// unknown systems, and on cyclic before/after constraints; all are caller
    /// misuse, reported at the build site.
    pub fn build(&mut self) {
        let count = self.systems.len();

        let mut index_by_name: HashMap<String, usize> = HashMap::with_capacity(count);
        for (index, system) in self.systems.iter().enumerate() {
            let name = system.name().to_string();
            if index_by_name.insert(name.clone(), index).is_some() {
                panic!("{}", DuplicateSystemError { name });
            }
        }

        // Ordering edges: edge (a, b) means b waits for a.
        let mut edges: HashSet<(usize, usize)> = HashSet::new();
        for (index, system) in self.systems.iter().enumerate() {
            for &target in system.run_after() {
                let other = *index_by_name.get(target).unwrap_or_else(|| {
                    panic!(
                        "{}",
                        UnknownOrderingTargetError {
                            system: system.name().to_string(),
                            target: target.to_string(),
                        }
                    )
                });
                edges.insert((other, index));
            }
            for &target in system.run_before() {
                let other = *index_by_name.get(target).unwrap_or_else(|| {
                    panic!(
                        "{}",
                        UnknownOrderingTargetError {
                            system: system.name().to_string(),
                            target: target.to_string(),
                        }
                    )
                });
                edges.insert((index, other));
            }
        }

        let mut prerequisites = vec![0usize; count];
        let mut release: Vec<Vec<usize>> = vec![Vec::new(); count];
        for &(from, to) in &edges {
            prerequisites[to] += 1;
            release[from].push(to);
        }

        // Kahn's algorithm purely as cycle detection; execution order is
        // decided at runtime by gates and locks.
        let mut degrees = prerequisites.clone();
        let mut queue: VecDeque<usize> =
            (0..count).filter(|&index| degrees[index] == 0).collect();
        let mut processed = 0usize;
        while let Some(index) = queue.pop_front() {
            processed += 1;
            for &dependent in &release[index] {
                degrees[dependent] -= 1;
                if degrees[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }
        if processed < count {
            let unresolved = (0..count)
                .filter(|&index| degrees[index] > 0)
                .map(|index| self.systems[index].name().to_string())
                .collect();
            panic!("{}", OrderingCycleError { unresolved });
        }

        // Lock table over every declared component id, ascending.
        let mut declared: Vec<ComponentID> = Vec::new();
        for system in &self.systems {
            if let Some(access) = system.access() {
                declared.extend(access.touched().iter_ids());
            }
        }
        declared.sort_unstable();
        declared.dedup();

        let lock_index: HashMap<ComponentID, usize> =
            declared.iter().enumerate().map(|(index, &id)| (id, index)).collect();

        let mut lock_plans = Vec::with_capacity(count);
        for system in &self.systems {
            match system.access() {
                Some(access) => {
                    let mut plan: Vec<(usize, LockMode)> = access
                        .touched()
                        .iter_ids()
                        .map(|id| {
                            let mode = if access.write.has(id) {
                                LockMode::Exclusive
                            } else {
                                LockMode::Shared
                            };
                            (lock_index[&id], mode)
                        })
                        .collect();
                    plan.sort_unstable_by_key(|&(index, _)| index);
                    lock_plans.push((LockMode::Shared, plan));
                }
                // Undeclared access: exclusive store lock, which subsumes
                // holding every component lock in write mode.
                None => lock_plans.push((LockMode::Exclusive, Vec::new())),
            }
        }

        // Diagnostic only: how many unordered system pairs the lock table
        // allows to run concurrently.
        let mut parallel_pairs = 0usize;
        for left in 0..count {
            for right in left + 1..count {
                if let (Some(a), Some(b)) =
                    (self.systems[left].access(), self.systems[right].access())
                {
                    if !a.conflicts_with(&b)
                        && !edges.contains(&(left, right))
                        && !edges.contains(&(right, left))
                    {
                        parallel_pairs += 1;
                    }
                }
            }
        }

        let locks = declared.iter().map(|_| RwLock::new(())).collect();
        self.plan = Some(Plan {
            prerequisites,
            release,
            lock_components: declared,
            locks,
            store_lock: RwLock::new(()),
            lock_plans,
        });
        self.phase.store(PHASE_RESOLVED, Ordering::Relaxed);
        log::debug!(
            "built system group: {count} systems, {} ordering edges, {} component locks, {parallel_pairs} parallelizable pairs",
            edges.len(),
            self.plan.as_ref().map(|plan| plan.lock_components.len()).unwrap_or(0)
        );
    }

    /// Executes one tick: every system runs exactly once, in parallel where
    /// ordering and locking allow.
    ///
    /// ## Panics
    /// Panics if the group has not been built since its system set last
    /// changed. System panics do not propagate; they are reported to the
    /// error handlers as [`SystemFault`]s.
    pub fn run_tick(&self, store: &Store) {
        let tick = self.next_tick.fetch_add(1, Ordering::Relaxed);
        self.run_numbered_tick(store, tick);
    }

    fn run_numbered_tick(&self, store: &Store, tick: Tick) {
        let plan = self
            .plan
            .as_ref()
            .expect("system group must be built before running a tick");
        let count = self.systems.len();
        self.phase.store(PHASE_RUNNING, Ordering::Relaxed);
        let tick_started = Instant::now();

        let gates: Vec<Gate> =
            plan.prerequisites.iter().map(|&initial| Gate::new(initial)).collect();
        let timings: Mutex<Vec<Option<SystemTiming>>> =
            Mutex::new((0..count).map(|_| None).collect());

        thread::scope(|scope| {
            for index in 0..count {
                let gates = &gates;
                let timings = &timings;
                let store_ref = store.store_ref();
                scope.spawn(move || {
                    let queued = Instant::now();
                    gates[index].wait();
                    let order_done = Instant::now();

                    let (store_mode, component_plan) = &plan.lock_plans[index];
                    let store_guard = match store_mode {
                        LockMode::Shared => LockGuard::Shared(plan.store_lock.read().unwrap()),
                        LockMode::Exclusive => {
                            LockGuard::Exclusive(plan.store_lock.write().unwrap())
                        }
                    };
                    let mut guards: Vec<LockGuard<'_>> =
                        Vec::with_capacity(component_plan.len());
                    for &(lock, mode) in component_plan {
                        guards.push(match mode {
                            LockMode::Shared => {
                                LockGuard::Shared(plan.locks[lock].read().unwrap())
                            }
                            LockMode::Exclusive => {
                                LockGuard::Exclusive(plan.locks[lock].write().unwrap())
                            }
                        });
                    }
                    let lock_done = Instant::now();

                    let result = catch_unwind(AssertUnwindSafe(|| {
                        self.systems[index].run(store_ref);
                    }));
                    let exec_done = Instant::now();

                    drop(guards);
                    drop(store_guard);
                    for &dependent in &plan.release[index] {
                        gates[dependent].arrive();
                    }

                    if let Err(payload) = result {
                        let fault = SystemFault {
                            system: self.systems[index].name().to_string(),
                            message: panic_message(payload),
                            backtrace: Backtrace::force_capture().to_string(),
                        };
                        log::error!("{fault}");
                        for handler in &self.on_error {
                            handler(&fault);
                        }
                    }

                    timings.lock().unwrap()[index] = Some(SystemTiming {
                        name: self.systems[index].name().to_string(),
                        wait_order: order_done - queued,
                        wait_lock: lock_done - order_done,
                        exec: exec_done - lock_done,
                        started: lock_done,
                        ended: exec_done,
                    });
                });
            }
        });

        self.phase.store(PHASE_DRAINED, Ordering::Relaxed);
        for hook in &self.after_tick {
            hook();
        }

        let recorded = timings
            .into_inner()
            .unwrap()
            .into_iter()
            .map(|timing| timing.expect("every system records a timing"))
            .collect();
        let mut stats = self.stats.lock().unwrap();
        stats.push_back(TickStats { tick, total: tick_started.elapsed(), systems: recorded });
        while stats.len() > self.stats_window {
            stats.pop_front();
        }
        drop(stats);
        self.phase.store(PHASE_RESOLVED, Ordering::Relaxed);
    }

    /// Fixed-step driver: ticks at the given interval, sleeping out the
    /// remainder of each period, until [`SystemGroup::stop`] is observed
    /// between ticks.
    pub fn run_fixed(&self, store: &Store, interval: Duration) {
        self.stop.store(false, Ordering::Relaxed);
        for handler in &self.on_start {
            handler();
        }
        while !self.stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            store.put_resource(TimeStep {
                delta: interval.as_secs_f64(),
                tick: self.next_tick.load(Ordering::Relaxed),
            });
            self.run_tick(store);
            let elapsed = started.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        for handler in &self.on_stop {
            handler();
        }
    }

    /// Variable-step driver: ticks back-to-back with no artificial delay,
    /// publishing the measured previous-tick duration as the time step.
    pub fn run_realtime(&self, store: &Store) {
        self.stop.store(false, Ordering::Relaxed);
        for handler in &self.on_start {
            handler();
        }
        let mut previous = Duration::ZERO;
        while !self.stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            store.put_resource(TimeStep {
                delta: previous.as_secs_f64(),
                tick: self.next_tick.load(Ordering::Relaxed),
            });
            self.run_tick(store);
            previous = started.elapsed();
        }
        for handler in &self.on_stop {
            handler();
        }
    }

    /// Stepped driver: executes exactly one tick under the given step
    /// number.
    pub fn run_step(&self, store: &Store, step: Tick) {
        store.put_resource(TimeStep { delta: 0.0, tick: step });
        self.run_numbered_tick(store, step);
    }
}

impl Default for SystemGroup {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
