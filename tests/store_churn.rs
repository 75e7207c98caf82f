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

const POPULATION: usize = 100_000;

fn spawn_with_both(store: &Store, seed: f32) -> EntityID {
    let entity = store.new_entity();
    let mut bundle = Bundle::new();
    bundle.insert(register_component::<Position>(), Position { x: seed, y: seed, z: seed });
    bundle.insert(register_component::<Velocity>(), Velocity { x: -seed, y: -seed, z: -seed });
    store.write_bundle(entity, bundle);
    entity
}

#[test]
fn mass_delete_leaves_survivors_intact() {
    let store = Store::new();

    let entities: Vec<EntityID> =
        (0..POPULATION).map(|index| spawn_with_both(&store, index as f32)).collect();

    for (index, &entity) in entities.iter().enumerate() {
        if index % 2 == 0 {
            assert!(store.delete(entity));
        }
    }

    for (index, &entity) in entities.iter().enumerate() {
        if index % 2 == 0 {
            assert!(!store.exists(entity));
            assert_eq!(store.read::<Position>(entity), None);
            assert_eq!(store.read::<Velocity>(entity), None);
        } else {
            let expected = index as f32;
            assert_eq!(store.read::<Position>(entity).unwrap().x, expected);
            assert_eq!(store.read::<Velocity>(entity).unwrap().x, -expected);
        }
    }

    let mut query = QueryBuilder::new().with::<Position>().with::<Velocity>();
    assert_eq!(store.store_ref().count(&mut query), POPULATION / 2);
}

#[test]
fn holes_are_reused_most_recent_first() {
    let store = Store::new();

    let first = spawn_with_both(&store, 1.0);
    let second = spawn_with_both(&store, 2.0);
    let (archetype, first_row) = store.store_ref().data().location_of(first).unwrap();

    store.delete(first);
    store.delete(second);

    // LIFO: the most recently freed hole (second's row) is reused first.
    let replacement = spawn_with_both(&store, 9.0);
    let (replacement_archetype, replacement_row) =
        store.store_ref().data().location_of(replacement).unwrap();
    assert_eq!(replacement_archetype, archetype);
    assert_ne!(replacement_row, first_row);

    let next = spawn_with_both(&store, 10.0);
    let (_, next_row) = store.store_ref().data().location_of(next).unwrap();
    assert_eq!(next_row, first_row);
}

#[test]
fn reused_rows_never_leak_previous_values() {
    let store = Store::new();

    let original = spawn_with_both(&store, 42.0);
    let (archetype, row) = store.store_ref().data().location_of(original).unwrap();
    store.delete(original);

    // The replacement reaches the same partition by migration: Position is
    // written first, Velocity arrives second and triggers the move into the
    // two-component shape, reusing the freed row.
    let replacement = store.new_entity();
    store.write(replacement, Position { x: 7.0, y: 7.0, z: 7.0 });
    store.write(replacement, Velocity { x: 8.0, y: 8.0, z: 8.0 });

    let (replacement_archetype, replacement_row) =
        store.store_ref().data().location_of(replacement).unwrap();
    assert_eq!((replacement_archetype, replacement_row), (archetype, row));

    assert_eq!(store.read::<Position>(replacement), Some(Position { x: 7.0, y: 7.0, z: 7.0 }));
    assert_eq!(store.read::<Velocity>(replacement), Some(Velocity { x: 8.0, y: 8.0, z: 8.0 }));
    assert_eq!(store.read::<Position>(original), None);
    assert_eq!(store.read::<Velocity>(original), None);
}

#[test]
fn iteration_skips_holes() {
    let store = Store::new();
    let entities: Vec<EntityID> = (0..10).map(|index| spawn_with_both(&store, index as f32)).collect();
    store.delete(entities[3]);
    store.delete(entities[7]);

    let mut query = QueryBuilder::new().with::<Position>().with::<Velocity>();
    let mut visited = Vec::new();
    store.store_ref().for_each2::<Position, Velocity, _>(&mut query, |entity, _, _| {
        visited.push(entity);
    });

    assert_eq!(visited.len(), 8);
    assert!(!visited.contains(&entities[3]));
    assert!(!visited.contains(&entities[7]));
}

#[test]
fn lazy_delete_is_safe_during_iteration() {
    let store = Store::new();
    let entities: Vec<EntityID> = (0..100).map(|index| spawn_with_both(&store, index as f32)).collect();

    let mut query = QueryBuilder::new().with::<Position>().with::<Velocity>();
    store.store_ref().for_each1::<Position, _>(&mut query, |entity, position| {
        if position.x as usize % 2 == 0 {
            store.delete(entity);
        }
    });

    for (index, &entity) in entities.iter().enumerate() {
        assert_eq!(store.exists(entity), index % 2 == 1);
    }
}
