use std::collections::BTreeSet;
use std::sync::Arc;

use super::Query;
use crate::registry::Recurse;
use crate::test_util::{self, Health, Position, Velocity};
use crate::{Entity, Error, Registry};

fn set_of(entities: impl IntoIterator<Item = Entity>) -> BTreeSet<Entity> {
    entities.into_iter().collect()
}

#[test]
fn test_lifecycle_scenario() {
    let registry = Arc::new(test_util::registry());
    assert!(registry.is_alive(Entity::WORLD));
    assert_eq!(Entity::WORLD.id(), 1);

    let entity = registry.create_entity().expect("world is alive");
    assert_eq!(entity.id(), 2);

    *registry.create_component::<Position>(entity).expect("entity is alive") = Position(1., 2.);

    let query =
        Query::builder(Arc::clone(&registry)).with::<Position>().expect("registered").build();
    assert_eq!(query.entities(), vec![entity]);

    let removed = registry.destroy_component::<Position>(entity).expect("component exists");
    assert_eq!(removed, Position(1., 2.));
    assert!(query.is_empty());

    registry.destroy_entity(entity, Recurse::Yes).expect("entity is alive");
    assert_eq!(registry.create_entity().expect("world is alive"), entity);
}

#[test]
fn test_empty_query_matches_everything() {
    let registry = Arc::new(test_util::registry());
    let query = Query::new(Arc::clone(&registry));
    assert_eq!(query.entities(), vec![Entity::WORLD]);

    let entity = registry.create_entity().expect("world is alive");
    assert!(query.contains(entity));
    assert_eq!(query.len(), 2);

    registry.destroy_entity(entity, Recurse::Yes).expect("entity is alive");
    assert!(!query.contains(entity));
}

#[test]
fn test_shared_filters() {
    let registry = Arc::new(test_util::registry());

    let first = Query::new(Arc::clone(&registry)).with::<Position>().expect("registered");
    let second = Query::new(Arc::clone(&registry)).with::<Position>().expect("registered");
    assert_eq!(registry.filter_count(), 1, "identical queries share a filter");
    assert_eq!(first.shared_count(), 2);

    let third = second.clone();
    assert_eq!(first.shared_count(), 3);

    drop(first);
    drop(second);
    assert_eq!(third.shared_count(), 1);
    drop(third);
    assert_eq!(registry.filter_count(), 0);
}

#[test]
fn test_type_order_is_irrelevant() {
    let registry = Arc::new(test_util::registry());
    let a = Query::new(Arc::clone(&registry))
        .with::<Position>()
        .and_then(Query::with::<Velocity>)
        .expect("registered");
    let b = Query::builder(Arc::clone(&registry))
        .with::<Velocity>()
        .and_then(|builder| builder.with::<Position>())
        .expect("registered")
        .build();
    assert_eq!(a.shared_count(), 2);
    drop(b);
}

#[test]
fn test_builder_registers_once() {
    let registry = Arc::new(test_util::registry());
    let entity = registry.create_entity().expect("world is alive");
    registry.insert_component(entity, Position(0., 0.)).expect("entity is alive");
    registry.insert_component(entity, Health(3)).expect("entity is alive");

    let builder = Query::builder(Arc::clone(&registry))
        .with::<Health>()
        .and_then(|builder| builder.with::<Position>())
        .and_then(|builder| builder.with::<Health>())
        .expect("registered");
    assert_eq!(registry.filter_count(), 0, "collecting types registers nothing");

    let query = builder.build();
    assert_eq!(registry.filter_count(), 1);
    assert_eq!(query.entities(), vec![entity]);

    let everything = Query::builder(Arc::clone(&registry)).build();
    assert_eq!(everything.len(), 2);
    assert_eq!(registry.filter_count(), 2);
}

#[test]
fn test_migration() {
    let registry = Arc::new(test_util::registry());
    let both = registry.create_entity().expect("world is alive");
    let only_position = registry.create_entity().expect("world is alive");
    registry.insert_component(both, Position(0., 0.)).expect("entity is alive");
    registry.insert_component(both, Velocity(1., 0.)).expect("entity is alive");
    registry.insert_component(only_position, Position(5., 5.)).expect("entity is alive");

    let mut query = Query::new(Arc::clone(&registry))
        .with::<Position>()
        .and_then(Query::with::<Velocity>)
        .expect("registered");
    assert_eq!(query.entities(), vec![both]);

    query.remove_component_type::<Velocity>().expect("registered");
    assert_eq!(set_of(&query), set_of([both, only_position]));
    assert_eq!(registry.filter_count(), 1, "the old filter is dropped after migration");

    query.remove_component_type::<Health>().expect("registered");
    assert_eq!(set_of(&query), set_of([both, only_position]));

    query.add_component_type::<Velocity>().expect("registered");
    assert_eq!(query.entities(), vec![both]);
}

#[test]
fn test_unregistered_type() {
    let registry = Arc::new(Registry::builder().register::<Position>().build());
    let result = Query::builder(Arc::clone(&registry)).with::<Velocity>();
    assert!(matches!(result, Err(Error::UnregisteredComponent(_))));
    assert_eq!(registry.filter_count(), 0);

    let result = Query::new(registry).with::<Velocity>();
    assert!(matches!(result, Err(Error::UnregisteredComponent(_))));
}

#[test]
fn test_concurrent_mutation() {
    test_util::init();

    const THREADS: usize = 4;
    const ENTITIES_PER_THREAD: usize = 64;

    for _ in 0..*test_util::CONCURRENT_TEST_REPETITIONS {
        let registry = Arc::new(test_util::registry());
        let query = Query::builder(Arc::clone(&registry))
            .with::<Position>()
            .and_then(|builder| builder.with::<Health>())
            .expect("registered")
            .build();

        rayon::scope(|scope| {
            for thread in 0..THREADS {
                let registry = &registry;
                scope.spawn(move |_| {
                    for i in 0..ENTITIES_PER_THREAD {
                        let entity = registry.create_entity().expect("world is alive");
                        registry.insert_component(entity, Position(0., 0.)).expect("alive");
                        if (thread + i) % 2 == 0 {
                            registry.insert_component(entity, Health(10)).expect("alive");
                        }
                        if i % 3 == 0 {
                            registry.destroy_entity(entity, Recurse::Yes).expect("alive");
                        }
                    }
                });
            }

            scope.spawn(|_| {
                for _ in 0..ENTITIES_PER_THREAD {
                    let snapshot = query.entities();
                    assert_eq!(set_of(snapshot.iter().copied()).len(), snapshot.len());
                    assert!(!snapshot.contains(&Entity::WORLD));
                }
            });
        });

        let expected: BTreeSet<_> = Query::new(Arc::clone(&registry))
            .iter()
            .filter(|&entity| {
                registry.has_component::<Position>(entity).expect("alive")
                    && registry.has_component::<Health>(entity).expect("alive")
            })
            .collect();
        assert_eq!(set_of(&query), expected);
        registry.assert_consistent();
    }
}
