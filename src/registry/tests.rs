use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};

use super::Recurse;
use crate::comp::Prototype;
use crate::test_util::{self, Health, Name, Position, Velocity};
use crate::{Entity, Error, Registry};

#[test]
fn test_world_exists() {
    let registry = test_util::registry();
    assert!(registry.is_alive(Entity::WORLD));
    assert_eq!(registry.entity_count(), 1);
    assert_eq!(registry.parent(Entity::WORLD), Ok(None));
    assert_eq!(registry.destroy_entity(Entity::WORLD, Recurse::Yes), Err(Error::WorldEntity));
}

#[test]
fn test_dead_entity() {
    let registry = test_util::registry();
    let entity = registry.create_entity().expect("world is alive");
    registry.destroy_entity(entity, Recurse::Yes).expect("entity is alive");

    assert!(!registry.is_alive(entity));
    assert_eq!(registry.destroy_entity(entity, Recurse::Yes), Err(Error::DeadEntity(entity)));
    assert_eq!(registry.insert_component(entity, Health(1)), Err(Error::DeadEntity(entity)));
    assert_eq!(registry.has_component::<Health>(entity), Err(Error::DeadEntity(entity)));
    assert!(matches!(registry.get_component::<Health>(entity), Err(Error::DeadEntity(_))));
    assert_eq!(registry.create_child(entity), Err(Error::DeadEntity(entity)));

    let never = Entity::from_raw(100).expect("nonzero id");
    assert_eq!(registry.is_active(never), Err(Error::DeadEntity(never)));
}

#[test]
fn test_component_access() {
    let registry = test_util::registry();
    let entity = registry.create_entity().expect("world is alive");

    assert_eq!(*registry.create_component::<Health>(entity).expect("entity is alive"), Health(0));
    assert!(matches!(
        registry.create_component::<Health>(entity),
        Err(Error::ComponentExists { .. })
    ));

    registry.get_component_mut::<Health>(entity).expect("component exists").0 = 42;
    assert_eq!(*registry.get_component::<Health>(entity).expect("component exists"), Health(42));

    assert!(matches!(
        registry.get_component::<Velocity>(entity),
        Err(Error::MissingComponent { .. })
    ));
    assert!(matches!(
        registry.destroy_component::<Velocity>(entity),
        Err(Error::MissingComponent { .. })
    ));

    assert_eq!(registry.destroy_component::<Health>(entity), Ok(Health(42)));
    assert_eq!(registry.has_component::<Health>(entity), Ok(false));
}

#[test]
#[cfg(not(feature = "blocking-sync"))]
#[should_panic = "Cannot acquire write access to a lock while the same thread holds read access"]
fn test_insert_while_reading_same_type_panics() {
    let registry = test_util::registry();
    let first = registry.create_entity().expect("world is alive");
    let second = registry.create_entity().expect("world is alive");
    registry.insert_component(first, Position(0., 0.)).expect("entity is alive");

    let _position = registry.get_component::<Position>(first).expect("component exists");
    let _ = registry.insert_component(second, Position(1., 1.));
}

#[test]
#[cfg(not(feature = "blocking-sync"))]
fn test_destroy_amid_component_readers() {
    test_util::init();

    const READERS: usize = 4;
    let registry = test_util::registry();
    let watched = registry.create_entity().expect("world is alive");
    registry.insert_component(watched, Position(0., 0.)).expect("entity is alive");
    let doomed = registry.create_entity().expect("world is alive");
    registry.insert_component(doomed, Position(1., 1.)).expect("entity is alive");
    let stop = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|| {
                while !stop.load(Ordering::Acquire) {
                    let _position = registry.get_component::<Position>(watched).expect("alive");
                    thread::sleep(Duration::from_micros(200));
                }
            });
        }

        let destroyer = scope.spawn(|| registry.destroy_entity(doomed, Recurse::Yes));
        let deadline = Instant::now() + Duration::from_secs(10);
        while !destroyer.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let finished = destroyer.is_finished();
        stop.store(true, Ordering::Release);
        assert!(finished, "destroy_entity was starved by component readers");
    });

    assert!(!registry.is_alive(doomed));
    registry.assert_consistent();
}

#[test]
fn test_concurrent_readers() {
    let registry = test_util::registry();
    let entity = registry.create_entity().expect("world is alive");
    registry.insert_component(entity, Name("shared".into())).expect("entity is alive");

    let first = registry.get_component::<Name>(entity).expect("component exists");
    let second = registry.get_component::<Name>(entity).expect("component exists");
    assert_eq!(first.0, second.0);
}

#[test]
fn test_unregistered_component() {
    let registry = Registry::builder().register::<Position>().register::<Position>().build();
    let entity = registry.create_entity().expect("world is alive");
    assert!(matches!(
        registry.insert_component(entity, Health(1)),
        Err(Error::UnregisteredComponent(_))
    ));
    assert!(matches!(registry.pool::<Health>(), Err(Error::UnregisteredComponent(_))));
}

#[test]
fn test_composition() {
    let registry = test_util::registry();
    let entity = registry.create_entity().expect("world is alive");
    registry.insert_component(entity, Health(3)).expect("entity is alive");
    registry.insert_component(entity, Position(1., 1.)).expect("entity is alive");

    let composition = registry.composition(entity).expect("entity is alive");
    assert_eq!(
        composition,
        vec![std::any::type_name::<Position>(), std::any::type_name::<Health>()],
        "composition is listed in registration order"
    );
}

#[test]
fn test_hierarchy() {
    let registry = test_util::registry();
    let parent = registry.create_entity().expect("world is alive");
    let child = registry.create_child(parent).expect("parent is alive");
    let grandchild = registry.create_child(child).expect("child is alive");

    assert_eq!(registry.parent(child), Ok(Some(parent)));
    assert_eq!(registry.children(parent), Ok(vec![child]));
    assert_eq!(
        registry.set_parent(parent, grandchild),
        Err(Error::HierarchyCycle { entity: parent, parent: grandchild })
    );
    assert_eq!(registry.set_parent(Entity::WORLD, parent), Err(Error::WorldEntity));

    registry.set_parent(grandchild, parent).expect("no cycle");
    assert_eq!(registry.children(parent), Ok(vec![child, grandchild]));
    assert_eq!(registry.children(child), Ok(vec![]));
}

#[test]
fn test_destroy_recursive() {
    let registry = test_util::registry();
    let parent = registry.create_entity().expect("world is alive");
    let child = registry.create_child(parent).expect("parent is alive");
    let grandchild = registry.create_child(child).expect("child is alive");
    registry.insert_component(grandchild, Health(1)).expect("entity is alive");

    assert_eq!(registry.destroy_entity(parent, Recurse::Yes), Ok(3));
    for entity in [parent, child, grandchild] {
        assert!(!registry.is_alive(entity));
    }
    assert_eq!(registry.children(Entity::WORLD), Ok(vec![]));
    assert!(registry.pool::<Health>().expect("registered").is_empty());
    registry.assert_consistent();
}

#[test]
fn test_destroy_reparents_to_world() {
    let registry = test_util::registry();
    let parent = registry.create_entity().expect("world is alive");
    let child = registry.create_child(parent).expect("parent is alive");

    assert_eq!(registry.destroy_entity(parent, Recurse::No), Ok(1));
    assert_eq!(registry.parent(child), Ok(Some(Entity::WORLD)));
    assert_eq!(registry.children(Entity::WORLD), Ok(vec![child]));
}

#[test]
fn test_active_flag() {
    let registry = test_util::registry();
    let entity = registry.create_entity().expect("world is alive");
    assert_eq!(registry.is_active(entity), Ok(true));
    registry.set_active(entity, false).expect("entity is alive");
    assert_eq!(registry.is_active(entity), Ok(false));
}

#[test]
fn test_instantiate() {
    let registry = test_util::registry();
    let prototype = Prototype::new()
        .with(Name("car".into()))
        .with(Position(0., 0.))
        .child(Prototype::new().with(Name("wheel".into())))
        .child(Prototype::new().with(Name("wheel".into())).with(Health(5)));
    assert_eq!(prototype.entity_count(), 3);

    let car = registry.instantiate(Entity::WORLD, &prototype).expect("world is alive");
    let wheels = registry.children(car).expect("car is alive");
    assert_eq!(wheels.len(), 2);
    assert_eq!(registry.get_component::<Name>(car).expect("instantiated").0, "car");
    for &wheel in &wheels {
        assert_eq!(registry.get_component::<Name>(wheel).expect("instantiated").0, "wheel");
    }
    assert_eq!(registry.has_component::<Health>(wheels[1]), Ok(true));

    let second = registry.instantiate(car, &prototype).expect("car is alive");
    assert_eq!(registry.parent(second), Ok(Some(car)));
    assert_eq!(registry.entity_count(), 7);
    registry.assert_consistent();
}

#[test]
fn test_instantiate_unregistered_is_atomic() {
    let registry = Registry::builder().register::<Name>().build();
    let prototype =
        Prototype::new().with(Name("root".into())).child(Prototype::new().with(Health(1)));

    assert!(matches!(
        registry.instantiate(Entity::WORLD, &prototype),
        Err(Error::UnregisteredComponent(_))
    ));
    assert_eq!(registry.entity_count(), 1);
}

#[test]
fn test_prototype_erases_component_types() {
    let prototype = Prototype::new().with(Health(1)).with(Position(2., 3.));
    let debug = format!("{prototype:?}");
    assert!(debug.contains("test_util::Health"), "{debug}");
    assert!(debug.contains("test_util::Position"), "{debug}");
    assert!(!debug.contains("Box"), "{debug}");

    let registry = test_util::registry();
    let entity = registry.instantiate(Entity::WORLD, &prototype).expect("world is alive");
    assert_eq!(*registry.get_component::<Health>(entity).expect("instantiated"), Health(1));
    let position = *registry.get_component::<Position>(entity).expect("instantiated");
    assert_eq!(position, Position(2., 3.));
    assert_eq!(registry.has_component::<Velocity>(entity), Ok(false));
}

#[test]
#[should_panic = "Cannot insert the same component type"]
fn test_prototype_duplicate_type() { let _ = Prototype::new().with(Health(1)).with(Health(2)); }

#[test]
fn test_composition_matches_pools() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xc0ffee);
    let registry = test_util::registry();
    let mut live = vec![Entity::WORLD];

    for _ in 0..3000 {
        let target = live[rng.gen_range(0..live.len())];
        match rng.gen_range(0..8) {
            0 => live.push(registry.create_child(target).expect("target is alive")),
            1 if !target.is_world() => {
                let recurse = if rng.gen() { Recurse::Yes } else { Recurse::No };
                registry.destroy_entity(target, recurse).expect("target is alive");
                live.retain(|&entity| registry.is_alive(entity));
            }
            2 => {
                let _ = registry.insert_component(target, Health(rng.gen()));
            }
            3 => {
                let _ = registry.destroy_component::<Health>(target);
            }
            4 => {
                let _ = registry.insert_component(target, Position(rng.gen(), rng.gen()));
            }
            5 => {
                let _ = registry.destroy_component::<Position>(target);
            }
            _ => {
                let _ = registry.insert_component(target, Velocity(0., 1.));
            }
        }
    }

    registry.assert_consistent();
    registry.pool::<Health>().expect("registered").assert_consistent();
    registry.pool::<Position>().expect("registered").assert_consistent();
}

#[test]
fn test_concurrent_structural_mutation() {
    test_util::init();

    const THREADS: usize = 4;
    const ENTITIES_PER_THREAD: usize = 100;

    for _ in 0..*test_util::CONCURRENT_TEST_REPETITIONS {
        let registry = test_util::registry();

        rayon::scope(|scope| {
            for _ in 0..THREADS {
                let registry = &registry;
                scope.spawn(move |_| {
                    for i in 0..ENTITIES_PER_THREAD {
                        let entity = registry.create_entity().expect("world is alive");
                        registry.insert_component(entity, Health(1)).expect("entity is alive");
                        if i % 2 == 0 {
                            registry.destroy_entity(entity, Recurse::Yes).expect("entity is alive");
                        }
                    }
                });
            }
        });

        assert_eq!(registry.entity_count(), 1 + THREADS * ENTITIES_PER_THREAD / 2);
        assert_eq!(registry.pool::<Health>().expect("registered").len(), THREADS * 50);
        registry.assert_consistent();
    }
}
