use simcore::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Health(u32);

#[test]
fn write_then_read_roundtrip() {
    let store = Store::new();
    let entity = store.new_entity();

    store.write(entity, Position { x: 1.0, y: 1.0, z: 1.0 });

    assert_eq!(store.read::<Position>(entity), Some(Position { x: 1.0, y: 1.0, z: 1.0 }));
    assert_eq!(store.read::<Velocity>(entity), None);
}

#[test]
fn migration_preserves_sibling_components() {
    let store = Store::new();
    let entity = store.new_entity();

    store.write(entity, Position { x: 1.0, y: 1.0, z: 1.0 });
    store.write(entity, Velocity { x: 2.0, y: 2.0, z: 2.0 });

    assert_eq!(store.read::<Position>(entity), Some(Position { x: 1.0, y: 1.0, z: 1.0 }));
    assert_eq!(store.read::<Velocity>(entity), Some(Velocity { x: 2.0, y: 2.0, z: 2.0 }));

    let mut query = QueryBuilder::new().with::<Position>().with::<Velocity>();
    assert_eq!(store.store_ref().count(&mut query), 1);
}

#[test]
fn in_place_write_does_not_migrate() {
    let store = Store::new();
    let entity = store.new_entity();

    store.write(entity, Position { x: 1.0, y: 0.0, z: 0.0 });
    let location_before = store.store_ref().data().location_of(entity);
    let generation_before = store.generation();

    store.write(entity, Position { x: 5.0, y: 0.0, z: 0.0 });

    assert_eq!(store.store_ref().data().location_of(entity), location_before);
    assert_eq!(store.generation(), generation_before);
    assert_eq!(store.read::<Position>(entity).unwrap().x, 5.0);
}

#[test]
fn archetype_ids_are_stable_per_mask() {
    let store = Store::new();

    let first = store.new_entity();
    store.write(first, Position::default());
    store.write(first, Velocity::default());
    let (archetype_first, _) = store.store_ref().data().location_of(first).unwrap();
    let generation = store.generation();

    // A second entity taking the same path lands in the same archetypes
    // without creating new ones.
    let second = store.new_entity();
    store.write(second, Position::default());
    store.write(second, Velocity::default());
    let (archetype_second, _) = store.store_ref().data().location_of(second).unwrap();

    assert_eq!(archetype_first, archetype_second);
    assert_eq!(store.generation(), generation);
}

#[test]
fn delete_removes_location_and_reports_presence() {
    let store = Store::new();
    let entity = store.new_entity();

    assert!(!store.exists(entity));
    store.write(entity, Position::default());
    assert!(store.exists(entity));

    assert!(store.delete(entity));
    assert!(!store.exists(entity));
    assert_eq!(store.read::<Position>(entity), None);

    // A second delete is a normal absent outcome, not an error.
    assert!(!store.delete(entity));
}

#[test]
fn delete_component_migrates_and_keeps_remainder() {
    let store = Store::new();
    let entity = store.new_entity();

    store.write(entity, Position { x: 3.0, y: 0.0, z: 0.0 });
    store.write(entity, Velocity { x: 4.0, y: 0.0, z: 0.0 });
    store.write(entity, Health(7));

    assert!(store.delete_component::<Velocity>(entity));
    assert_eq!(store.read::<Velocity>(entity), None);
    assert_eq!(store.read::<Position>(entity).unwrap().x, 3.0);
    assert_eq!(store.read::<Health>(entity), Some(Health(7)));
}

#[test]
fn deleting_last_component_removes_the_entity() {
    let store = Store::new();
    let entity = store.new_entity();

    store.write(entity, Health(1));
    assert!(store.delete_component::<Health>(entity));
    assert!(!store.exists(entity));
}

#[test]
fn bundle_write_performs_a_single_migration() {
    let store = Store::new();
    let entity = store.new_entity();
    store.write(entity, Health(9));
    let generation_before = store.generation();

    let mut bundle = Bundle::new();
    bundle.insert(register_component::<Position>(), Position { x: 1.0, y: 2.0, z: 3.0 });
    bundle.insert(register_component::<Velocity>(), Velocity { x: 4.0, y: 5.0, z: 6.0 });
    store.write_bundle(entity, bundle);

    // One destination archetype {Health, Position, Velocity}; the two
    // intermediate single-addition shapes are never materialized.
    assert_eq!(store.generation(), generation_before + 1);
    assert_eq!(store.read::<Health>(entity), Some(Health(9)));
    assert_eq!(store.read::<Position>(entity).unwrap().y, 2.0);
    assert_eq!(store.read::<Velocity>(entity).unwrap().z, 6.0);
}

#[test]
fn read_ref_sees_the_stored_value() {
    let store = Store::new();
    let entity = store.new_entity();
    store.write(entity, Position { x: 8.0, y: 0.0, z: 0.0 });

    let position = store.read_ref::<Position>(entity).unwrap();
    assert_eq!(position.x, 8.0);
}

#[test]
fn entire_row_snapshot_holds_every_component() {
    let store = Store::new();
    let entity = store.new_entity();
    store.write(entity, Position { x: 1.0, y: 0.0, z: 0.0 });
    store.write(entity, Health(3));

    let mut snapshot = store.read_entire_row(entity).unwrap();
    assert_eq!(snapshot.mask().count(), 2);
    let health = snapshot
        .take(register_component::<Health>())
        .unwrap()
        .downcast::<Health>()
        .unwrap();
    assert_eq!(*health, Health(3));
}

#[test]
fn resources_are_per_store_singletons() {
    #[derive(Debug, PartialEq)]
    struct WorldBounds {
        extent: f32,
    }

    let store = Store::new();
    assert!(store.get_resource::<WorldBounds>().is_none());

    store.put_resource(WorldBounds { extent: 100.0 });
    assert_eq!(store.get_resource::<WorldBounds>().unwrap().extent, 100.0);

    store.get_resource_mut::<WorldBounds>().unwrap().extent = 50.0;
    assert_eq!(store.get_resource::<WorldBounds>().unwrap().extent, 50.0);

    // Replacement keeps the singleton property.
    store.put_resource(WorldBounds { extent: 1.0 });
    assert_eq!(store.get_resource::<WorldBounds>().unwrap().extent, 1.0);
}

#[test]
fn disjoint_id_ranges_yield_disjoint_entities() {
    let store_a = Store::with_config(StoreConfig { id_min: 1, id_max: 10_000, ..Default::default() });
    let store_b =
        Store::with_config(StoreConfig { id_min: 10_000, id_max: 20_000, ..Default::default() });

    for _ in 0..100 {
        assert!(store_a.new_entity() < 10_000);
        assert!(store_b.new_entity() >= 10_000);
    }
}

#[test]
#[should_panic(expected = "invalid entity")]
fn writing_to_the_invalid_entity_aborts() {
    let store = Store::new();
    store.write(simcore::INVALID_ENTITY, Position::default());
}
