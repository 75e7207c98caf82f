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

#[test]
fn staged_writes_apply_on_execute_in_order() {
    let store = Store::new();
    let mut commands = CommandBuffer::new();
    let entity = store.new_entity();

    commands.write(entity).insert(Position { x: 1.0, y: 1.0, z: 1.0 });
    assert_eq!(store.read::<Position>(entity), None, "staging must not touch the store");

    commands.execute(&store);
    assert_eq!(store.read::<Position>(entity), Some(Position { x: 1.0, y: 1.0, z: 1.0 }));
    assert!(commands.is_empty());

    commands.write(entity).insert(Velocity { x: 2.0, y: 2.0, z: 2.0 });
    commands.execute(&store);

    assert_eq!(store.read::<Position>(entity), Some(Position { x: 1.0, y: 1.0, z: 1.0 }));
    assert_eq!(store.read::<Velocity>(entity), Some(Velocity { x: 2.0, y: 2.0, z: 2.0 }));
}

#[test]
fn later_staged_values_win() {
    let store = Store::new();
    let mut commands = CommandBuffer::new();
    let entity = store.new_entity();

    commands.write(entity).insert(Position { x: 1.0, y: 0.0, z: 0.0 });
    commands.write(entity).insert(Position { x: 2.0, y: 0.0, z: 0.0 });
    commands.execute(&store);

    assert_eq!(store.read::<Position>(entity).unwrap().x, 2.0);
}

#[test]
fn spawn_hands_out_a_usable_pending_id() {
    let store = Store::new();
    let mut commands = CommandBuffer::new();

    let pending = commands
        .spawn_empty(&store)
        .insert(Position { x: 5.0, y: 5.0, z: 5.0 })
        .insert(Velocity { x: 6.0, y: 6.0, z: 6.0 })
        .entity();

    assert!(!store.exists(pending), "location appears only at execute");
    commands.execute(&store);

    assert!(store.exists(pending));
    assert_eq!(store.read::<Position>(pending).unwrap().x, 5.0);

    let mut query = QueryBuilder::new().with::<Position>().with::<Velocity>();
    assert_eq!(store.store_ref().count(&mut query), 1);
}

#[test]
fn cancel_turns_a_staged_command_into_a_noop() {
    let store = Store::new();
    let mut commands = CommandBuffer::new();
    let entity = store.new_entity();

    let doomed = commands.write(entity).insert(Position { x: 9.0, y: 0.0, z: 0.0 }).index();
    let kept_entity = commands
        .spawn_empty(&store)
        .insert(Velocity { x: 1.0, y: 0.0, z: 0.0 })
        .entity();

    // Cancelling by index keeps later queue slots stable.
    commands.cancel(doomed);
    assert_eq!(commands.len(), 2);
    commands.execute(&store);

    assert_eq!(store.read::<Position>(entity), None);
    assert!(store.exists(kept_entity));
}

#[test]
fn cancelled_spawn_never_materializes() {
    let store = Store::new();
    let mut commands = CommandBuffer::new();

    let pending = commands.spawn_empty(&store).insert(Position::default());
    let entity = pending.entity();
    pending.cancel();
    commands.execute(&store);

    assert!(!store.exists(entity));
}

#[test]
fn spawn_with_no_values_stays_absent() {
    let store = Store::new();
    let mut commands = CommandBuffer::new();

    let pending = commands.spawn_empty(&store).entity();
    commands.execute(&store);

    assert!(!store.exists(pending));
}

#[test]
fn buffer_is_reusable_across_executes() {
    let store = Store::new();
    let mut commands = CommandBuffer::new();

    for round in 0..10 {
        for index in 0..50 {
            commands
                .spawn_empty(&store)
                .insert(Position { x: (round * 50 + index) as f32, y: 0.0, z: 0.0 });
        }
        commands.execute(&store);
        assert!(commands.is_empty());
    }

    let mut query = QueryBuilder::new().with::<Position>();
    assert_eq!(store.store_ref().count(&mut query), 500);
}

#[test]
#[should_panic(expected = "invalid entity")]
fn staging_a_write_to_the_invalid_entity_aborts() {
    let mut commands = CommandBuffer::new();
    commands.write(simcore::INVALID_ENTITY);
}
