use criterion::*;
use kinetic::registry::Recurse;
use kinetic::{Entity, Prototype, Registry};

#[derive(Clone, Copy)]
struct CompN<const N: usize>(i32);

fn registry() -> Registry {
    Registry::builder()
        .register::<CompN<1>>()
        .register::<CompN<2>>()
        .register::<CompN<3>>()
        .register::<CompN<4>>()
        .register::<CompN<5>>()
        .register::<CompN<6>>()
        .register::<CompN<7>>()
        .register::<CompN<8>>()
        .build()
}

fn delete_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete entity");

    macro_rules! delete_entity_batch {
        ($num_comps:literal; $($comps:expr),* $(,)?) => {
            let prototype = Prototype::new()$(.with($comps))*;
            for log_entities in (0..=8).step_by(4) {
                let entities = 1 << log_entities;
                group.throughput(Throughput::Elements(entities));
                group.bench_with_input(
                    BenchmarkId::new(
                        format!("{} components", $num_comps),
                        format!("{entities} entities"),
                    ),
                    &entities,
                    |b, &entities| {
                        b.iter_batched(
                            || {
                                let registry = registry();
                                let created: Vec<_> = (0..entities)
                                    .map(|_| {
                                        registry
                                            .instantiate(Entity::WORLD, &prototype)
                                            .expect("all components are registered")
                                    })
                                    .collect();
                                (registry, created)
                            },
                            |(registry, created)| {
                                for entity in created {
                                    registry
                                        .destroy_entity(entity, Recurse::Yes)
                                        .expect("entity is alive");
                                }
                                registry
                            },
                            BatchSize::SmallInput,
                        );
                    },
                );
            }
        };
    }

    delete_entity_batch!(0; );
    delete_entity_batch!(1; CompN::<1>(1));
    delete_entity_batch!(2; CompN::<1>(1), CompN::<2>(2));
    delete_entity_batch!(4; CompN::<1>(1), CompN::<2>(2), CompN::<3>(3), CompN::<4>(4));
    delete_entity_batch!(
        8;
        CompN::<1>(1), CompN::<2>(2), CompN::<3>(3), CompN::<4>(4),
        CompN::<5>(5), CompN::<6>(6), CompN::<7>(7), CompN::<8>(8),
    );
}

criterion_group!(benches, delete_entity);
criterion_main!(benches);
