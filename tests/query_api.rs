use phalanx::{CacheKind, ComponentId, EcsError, Event, Value, World, WorldOptions};

const HEALTH: ComponentId = ComponentId::new(1);
const POSITION: ComponentId = ComponentId::new(2);
const ARMOR: ComponentId = ComponentId::new(3);
const SHIELD: ComponentId = ComponentId::new(4);

fn release_world() -> World {
    World::with_options(WorldOptions {
        debug_mode: Some(false),
        profiling_mode: Some(false),
    })
}

#[test]
fn exclude_rejects_archetypes_with_the_component() {
    let mut world = release_world();
    let plain = world.entity().unwrap();
    world.set(plain, HEALTH, 1).unwrap();
    let armored = world.entity().unwrap();
    world
        .set(armored, HEALTH, 2)
        .unwrap()
        .set(armored, POSITION, 3)
        .unwrap();

    let view = world
        .query(&[HEALTH])
        .unwrap()
        .without(&[POSITION])
        .unwrap();
    let rows: Vec<_> = view.view().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity(), plain);
}

#[test]
fn any_needs_one_of_the_listed_components() {
    let mut world = release_world();
    let armored = world.entity().unwrap();
    world
        .set(armored, HEALTH, 1)
        .unwrap()
        .set(armored, ARMOR, 1)
        .unwrap();
    let shielded = world.entity().unwrap();
    world
        .set(shielded, HEALTH, 1)
        .unwrap()
        .set(shielded, SHIELD, 1)
        .unwrap();
    let bare = world.entity().unwrap();
    world.set(bare, HEALTH, 1).unwrap();

    let view = world
        .query(&[HEALTH])
        .unwrap()
        .any(&[ARMOR, SHIELD])
        .unwrap();
    let mut matched: Vec<_> = view.view().map(|row| row.entity()).collect();
    matched.sort_by_key(|entity| entity.id());
    assert_eq!(matched, vec![armored, shielded]);
}

#[test]
fn with_narrows_without_widening_the_projection() {
    let mut world = release_world();
    let plain = world.entity().unwrap();
    world.set(plain, HEALTH, 1).unwrap();
    let positioned = world.entity().unwrap();
    world
        .set(positioned, HEALTH, 2)
        .unwrap()
        .set(positioned, POSITION, 3)
        .unwrap();

    let view = world.query(&[HEALTH]).unwrap().with(&[POSITION]).unwrap();
    let rows: Vec<_> = view.view().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity(), positioned);
    // Only the originally declared column is projected.
    assert_eq!(rows[0].values().len(), 1);
    assert_eq!(rows[0].get(0), Some(&Value::Int(2)));
}

#[test]
fn empty_component_list_is_rejected() {
    let world = release_world();
    assert_eq!(
        world.query(&[]).err(),
        Some(EcsError::InvalidOperation(
            "query requires at least one component"
        ))
    );
}

#[test]
fn projection_follows_declared_order() {
    let mut world = release_world();
    let entity = world.entity().unwrap();
    world
        .set(entity, HEALTH, 1)
        .unwrap()
        .set(entity, POSITION, 2)
        .unwrap();

    let view = world.query(&[POSITION, HEALTH]).unwrap();
    let rows: Vec<_> = view.view().collect();
    assert_eq!(rows[0].get(0), Some(&Value::Int(2)));
    assert_eq!(rows[0].get(1), Some(&Value::Int(1)));
}

#[test]
fn iteration_is_archetype_major() {
    let mut world = release_world();
    let mut plain = Vec::new();
    for value in 0..2i64 {
        let entity = world.entity().unwrap();
        world.set(entity, HEALTH, value).unwrap();
        plain.push(entity);
    }
    let positioned = world.entity().unwrap();
    world
        .set(positioned, HEALTH, 2)
        .unwrap()
        .set(positioned, POSITION, 0)
        .unwrap();

    let order: Vec<_> = world
        .query(&[HEALTH])
        .unwrap()
        .view()
        .map(|row| row.entity())
        .collect();
    assert_eq!(order, vec![plain[0], plain[1], positioned]);
}

#[test]
fn first_level_results_are_cached_until_the_archetype_set_changes() {
    let mut world = release_world();
    let entity = world.entity().unwrap();
    world.set(entity, HEALTH, 1).unwrap();

    let (sender, receiver) = crossbeam_channel::unbounded();
    world.subscribe(sender);

    let query_insertions = |receiver: &crossbeam_channel::Receiver<Event>| {
        receiver
            .try_iter()
            .filter(|event| matches!(event, Event::Cached(CacheKind::Query, _)))
            .count()
    };

    assert_eq!(world.query(&[HEALTH]).unwrap().view().count(), 1);
    assert_eq!(query_insertions(&receiver), 1);

    // Row-level mutation leaves the cached entry valid.
    world.set(entity, HEALTH, 2).unwrap();
    assert_eq!(world.query(&[HEALTH]).unwrap().view().count(), 1);
    assert_eq!(query_insertions(&receiver), 0);

    // A structural change invalidates it.
    let other = world.entity().unwrap();
    world
        .set(other, HEALTH, 3)
        .unwrap()
        .set(other, POSITION, 4)
        .unwrap();
    assert_eq!(world.query(&[HEALTH]).unwrap().view().count(), 2);
    assert_eq!(query_insertions(&receiver), 1);
}

#[test]
fn cleanup_tears_down_emptied_archetypes() {
    let mut world = release_world();
    let entity = world.entity().unwrap();
    world
        .set(entity, HEALTH, 1)
        .unwrap()
        .set(entity, POSITION, 2)
        .unwrap();
    world.despawn(entity).unwrap();

    let (sender, receiver) = crossbeam_channel::unbounded();
    world.subscribe(sender);
    world.cleanup().unwrap();
    assert!(receiver.try_iter().any(|event| event == Event::Cleanup));

    // The world keeps working after the teardown: archetypes, edges and
    // caches are rebuilt on demand.
    let reborn = world.entity().unwrap();
    world
        .set(reborn, HEALTH, 5)
        .unwrap()
        .set(reborn, POSITION, 6)
        .unwrap();
    let view = world.query(&[HEALTH, POSITION]).unwrap();
    let rows: Vec<_> = view.view().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(&Value::Int(5)));
    assert_eq!(rows[0].get(1), Some(&Value::Int(6)));
}

#[test]
fn cleanup_spares_populated_archetypes() {
    let mut world = release_world();
    let keeper = world.entity().unwrap();
    world.set(keeper, HEALTH, 1).unwrap();
    let goner = world.entity().unwrap();
    world.set(goner, HEALTH, 2).unwrap();
    world.despawn(goner).unwrap();

    world.cleanup().unwrap();

    assert_eq!(world.has(keeper, HEALTH).unwrap(), Some(&Value::Int(1)));
    assert_eq!(world.query(&[HEALTH]).unwrap().view().count(), 1);
}

#[test]
fn out_of_range_ids_are_skipped_in_release_filters() {
    let mut world = release_world();
    let entity = world.entity().unwrap();
    world.set(entity, HEALTH, 1).unwrap();

    let view = world
        .query(&[HEALTH])
        .unwrap()
        .without(&[ComponentId::new(99)])
        .unwrap();
    assert_eq!(view.view().count(), 1);

    // A query whose every id is out of range has nothing to match.
    assert_eq!(
        world.query(&[ComponentId::new(99)]).err(),
        Some(EcsError::Query("no valid component to match"))
    );
}

#[test]
fn refinement_chains_compose() {
    let mut world = release_world();
    let soldier = world.entity().unwrap();
    world
        .set(soldier, HEALTH, 1)
        .unwrap()
        .set(soldier, ARMOR, 2)
        .unwrap();
    let medic = world.entity().unwrap();
    world
        .set(medic, HEALTH, 3)
        .unwrap()
        .set(medic, SHIELD, 4)
        .unwrap();
    let civilian = world.entity().unwrap();
    world.set(civilian, HEALTH, 5).unwrap();

    let view = world
        .query(&[HEALTH])
        .unwrap()
        .any(&[ARMOR, SHIELD])
        .unwrap()
        .without(&[SHIELD])
        .unwrap();
    let matched: Vec<_> = view.view().map(|row| row.entity()).collect();
    assert_eq!(matched, vec![soldier]);
}
