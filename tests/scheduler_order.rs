use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use simcore::prelude::*;
use simcore::TimeStep;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Wealth {
    value: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Productivity {
    rate: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Hunger {
    value: f32,
}

fn populate(store: &Store, count: usize) {
    for index in 0..count {
        let entity = store.new_entity();
        let mut bundle = Bundle::new();
        bundle.insert(register_component::<Wealth>(), Wealth { value: index as f32 });
        bundle.insert(register_component::<Productivity>(), Productivity { rate: 1.0 });
        bundle.insert(register_component::<Hunger>(), Hunger { value: 0.0 });
        store.write_bundle(entity, bundle);
    }
}

fn timing_of<'a>(stats: &'a simcore::TickStats, name: &str) -> &'a simcore::SystemTiming {
    stats.systems.iter().find(|timing| timing.name == name).unwrap()
}

#[test]
fn declared_ordering_is_respected_across_many_ticks() {
    let _ = env_logger::builder().is_test(true).try_init();

    const TICKS: usize = 1_000;
    let store = Store::new();
    populate(&store, 100);

    let mut group = SystemGroup::new().with_stats_window(TICKS);

    // M and S both gate C; M and S themselves are unordered.
    group.add_system(
        FnSystem::new("movement", |store: StoreRef<'_>| {
            let mut query = QueryBuilder::new().with::<Wealth>();
            store.for_each1::<Wealth, _>(&mut query, |_, wealth| {
                wealth.value += 1.0;
            });
        })
        .writes::<Wealth>()
        .before("consumption"),
    );
    group.add_system(
        FnSystem::new("supply", |store: StoreRef<'_>| {
            let mut query = QueryBuilder::new().with::<Productivity>();
            store.for_each1::<Productivity, _>(&mut query, |_, productivity| {
                productivity.rate *= 1.0;
            });
        })
        .writes::<Productivity>()
        .before("consumption"),
    );
    group.add_system(
        FnSystem::new("consumption", |store: StoreRef<'_>| {
            let mut query = QueryBuilder::new().with::<Hunger>();
            store.for_each1::<Hunger, _>(&mut query, |_, hunger| {
                hunger.value += 0.5;
            });
        })
        .writes::<Hunger>()
        .after("movement")
        .after("supply"),
    );
    group.build();

    for _ in 0..TICKS {
        group.run_tick(&store);
    }

    let stats = group.statistics();
    assert_eq!(stats.len(), TICKS);
    for tick in &stats {
        let movement = timing_of(tick, "movement");
        let supply = timing_of(tick, "supply");
        let consumption = timing_of(tick, "consumption");
        assert!(
            consumption.started >= movement.ended,
            "consumption started before movement completed (tick {})",
            tick.tick
        );
        assert!(
            consumption.started >= supply.ended,
            "consumption started before supply completed (tick {})",
            tick.tick
        );
    }
}

#[test]
fn conflicting_writers_never_overlap() {
    const TICKS: usize = 200;
    let store = Store::new();
    populate(&store, 100);

    let mut group = SystemGroup::new().with_stats_window(TICKS);
    for name in ["earn", "spend"] {
        group.add_system(
            FnSystem::new(name, |store: StoreRef<'_>| {
                let mut query = QueryBuilder::new().with::<Wealth>();
                store.for_each1::<Wealth, _>(&mut query, |_, wealth| {
                    wealth.value += 1.0;
                });
                thread::sleep(Duration::from_micros(200));
            })
            .writes::<Wealth>(),
        );
    }
    group.build();

    for _ in 0..TICKS {
        group.run_tick(&store);
    }

    for tick in &group.statistics() {
        let earn = timing_of(tick, "earn");
        let spend = timing_of(tick, "spend");
        let overlap = earn.started < spend.ended && spend.started < earn.ended;
        assert!(!overlap, "overlapping write systems shared an execution window");
    }
}

#[test]
fn undeclared_systems_exclude_everything() {
    const TICKS: usize = 100;
    let store = Store::new();
    populate(&store, 10);

    let mut group = SystemGroup::new().with_stats_window(TICKS);
    group.add_system(
        FnSystem::new("declared", |_| {
            thread::sleep(Duration::from_micros(100));
        })
        .writes::<Wealth>(),
    );
    // No declared access: conservatively whole-store exclusive.
    group.add_system(FnSystem::new("undeclared", |_| {
        thread::sleep(Duration::from_micros(100));
    }));
    group.build();

    for _ in 0..TICKS {
        group.run_tick(&store);
    }

    for tick in &group.statistics() {
        let declared = timing_of(tick, "declared");
        let undeclared = timing_of(tick, "undeclared");
        let overlap = declared.started < undeclared.ended && undeclared.started < declared.ended;
        assert!(!overlap, "an undeclared system overlapped another system");
    }
}

#[test]
fn a_faulting_system_does_not_abort_its_siblings() {
    let store = Store::new();
    populate(&store, 10);

    let healthy_runs = Arc::new(AtomicU32::new(0));
    let faults: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut group = SystemGroup::new();
    {
        let healthy_runs = Arc::clone(&healthy_runs);
        group.add_system(
            FnSystem::new("healthy", move |_| {
                healthy_runs.fetch_add(1, Ordering::Relaxed);
            })
            .writes::<Wealth>(),
        );
    }
    group.add_system(
        FnSystem::new("faulty", |_| {
            panic!("deliberate fault for testing");
        })
        .writes::<Hunger>(),
    );
    {
        let faults = Arc::clone(&faults);
        group.on_error(move |fault| {
            faults.lock().unwrap().push(format!("{}: {}", fault.system, fault.message));
        });
    }
    group.build();

    for _ in 0..3 {
        group.run_tick(&store);
    }

    assert_eq!(healthy_runs.load(Ordering::Relaxed), 3);
    let reported = faults.lock().unwrap();
    assert_eq!(reported.len(), 3);
    assert!(reported.iter().all(|line| line.starts_with("faulty: ")));
    assert!(reported[0].contains("deliberate fault"));
}

#[test]
fn fixed_driver_observes_stop_between_ticks() {
    let store = Store::new();
    populate(&store, 10);

    let ticks_seen = Arc::new(AtomicU32::new(0));
    let started = Arc::new(AtomicU32::new(0));
    let stopped = Arc::new(AtomicU32::new(0));

    let group = Arc::new({
        let mut group = SystemGroup::new();
        let ticks_seen = Arc::clone(&ticks_seen);
        group.add_system(
            FnSystem::new("counter", move |_| {
                ticks_seen.fetch_add(1, Ordering::Relaxed);
            })
            .writes::<Wealth>(),
        );
        {
            let started = Arc::clone(&started);
            group.on_start(move || {
                started.fetch_add(1, Ordering::Relaxed);
            });
        }
        {
            let stopped = Arc::clone(&stopped);
            group.on_stop(move || {
                stopped.fetch_add(1, Ordering::Relaxed);
            });
        }
        group.build();
        group
    });

    let driver = {
        let group = Arc::clone(&group);
        let store = store; // moved into the driver thread
        thread::spawn(move || {
            group.run_fixed(&store, Duration::from_millis(1));
        })
    };

    while ticks_seen.load(Ordering::Relaxed) < 5 {
        thread::yield_now();
    }
    group.stop();
    driver.join().unwrap();

    assert!(ticks_seen.load(Ordering::Relaxed) >= 5);
    assert_eq!(started.load(Ordering::Relaxed), 1);
    assert_eq!(stopped.load(Ordering::Relaxed), 1);
}

#[test]
fn stepped_driver_publishes_the_step_number() {
    let store = Store::new();
    populate(&store, 10);

    let observed: Arc<Mutex<Vec<(u64, f64)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut group = SystemGroup::new();
    {
        let observed = Arc::clone(&observed);
        group.add_system(
            FnSystem::new("observer", move |store: StoreRef<'_>| {
                let step = *store.data().resource::<TimeStep>().unwrap();
                observed.lock().unwrap().push((step.tick, step.delta));
            })
            .reads::<Wealth>(),
        );
    }
    group.build();

    group.run_step(&store, 41);
    group.run_step(&store, 42);

    assert_eq!(*observed.lock().unwrap(), vec![(41, 0.0), (42, 0.0)]);
    let time_step = store.get_resource::<TimeStep>().unwrap();
    assert_eq!(time_step.tick, 42);
}

#[test]
fn statistics_ring_is_bounded() {
    let store = Store::new();
    populate(&store, 10);

    let mut group = SystemGroup::new().with_stats_window(8);
    group.add_system(FnSystem::new("noop", |_| {}).reads::<Wealth>());
    group.build();

    for _ in 0..32 {
        group.run_tick(&store);
    }

    let stats = group.statistics();
    assert_eq!(stats.len(), 8);
    // The ring keeps the most recent ticks.
    assert_eq!(stats.last().unwrap().tick, 31);
    assert_eq!(stats.first().unwrap().tick, 24);
    for tick in &stats {
        assert_eq!(tick.systems.len(), 1);
        assert_eq!(tick.systems[0].name, "noop");
    }
}

#[test]
fn group_phase_tracks_the_tick_lifecycle() {
    use simcore::GroupPhase;

    let store = Store::new();
    populate(&store, 10);

    let mut group = SystemGroup::new();
    assert_eq!(group.phase(), GroupPhase::Idle);

    group.add_system(FnSystem::new("noop", |_| {}).reads::<Wealth>());
    group.build();
    assert_eq!(group.phase(), GroupPhase::Resolved);

    group.run_tick(&store);
    assert_eq!(group.phase(), GroupPhase::Resolved);

    // Adding a system invalidates the resolved plan.
    group.add_system(FnSystem::new("other", |_| {}).reads::<Wealth>());
    assert_eq!(group.phase(), GroupPhase::Idle);
}

#[test]
#[should_panic(expected = "form a cycle")]
fn cyclic_ordering_constraints_abort_at_build() {
    let mut group = SystemGroup::new();
    group.add_system(FnSystem::new("first", |_| {}).after("second"));
    group.add_system(FnSystem::new("second", |_| {}).after("first"));
    group.build();
}

#[test]
#[should_panic(expected = "duplicate system name")]
fn duplicate_system_names_abort_at_build() {
    let mut group = SystemGroup::new();
    group.add_system(FnSystem::new("twin", |_| {}));
    group.add_system(FnSystem::new("twin", |_| {}));
    group.build();
}

#[test]
#[should_panic(expected = "unknown system")]
fn ordering_against_an_unknown_system_aborts_at_build() {
    let mut group = SystemGroup::new();
    group.add_system(FnSystem::new("lonely", |_| {}).after("phantom"));
    group.build();
}
