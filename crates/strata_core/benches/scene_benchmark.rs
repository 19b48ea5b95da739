//! # Scene Benchmarks
//!
//! Spawn throughput, query iteration and component migration.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use strata_core::{Entity, Light, PhysicsBody, Scene, Transform, Vec3};

const ENTITY_COUNT: usize = 100_000;

fn populated_scene(count: usize) -> (Scene, Vec<Entity>) {
    let mut scene = Scene::with_defaults("bench");
    let entities = (0..count)
        .map(|i| {
            let position = Vec3::new(i as f32, 0.0, 0.0);
            scene
                .spawn((Transform::from_position(position), Light::default()))
                .unwrap()
        })
        .collect();
    (scene, entities)
}

// =============================================================================
// SPAWN
// =============================================================================

fn bench_spawn(c: &mut Criterion) {
    c.bench_function("spawn_transform_light_100k", |b| {
        b.iter_batched(
            || Scene::with_defaults("spawn"),
            |mut scene| {
                for _ in 0..ENTITY_COUNT {
                    black_box(scene.spawn((Transform::IDENTITY, Light::default())).unwrap());
                }
                scene
            },
            BatchSize::LargeInput,
        );
    });
}

// =============================================================================
// QUERIES
// =============================================================================

fn bench_query_read(c: &mut Criterion) {
    let (scene, _) = populated_scene(ENTITY_COUNT);

    c.bench_function("query_read_100k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for (_, (transform, light)) in scene.query::<(&Transform, &Light)>().iter() {
                sum += transform.position.x * light.intensity;
            }
            black_box(sum)
        });
    });
}

fn bench_query_write(c: &mut Criterion) {
    let (mut scene, _) = populated_scene(ENTITY_COUNT);

    c.bench_function("query_write_100k", |b| {
        b.iter(|| {
            let mut view = scene.query_mut::<(&mut Transform, &Light)>().unwrap();
            for (_, (transform, light)) in view.iter_mut() {
                transform.position.y += light.intensity * 0.016;
            }
        });
    });
}

// =============================================================================
// MIGRATION
// =============================================================================

fn bench_migration(c: &mut Criterion) {
    c.bench_function("add_remove_physics_10k", |b| {
        b.iter_batched(
            || populated_scene(10_000),
            |(mut scene, entities)| {
                for (i, &entity) in entities.iter().enumerate() {
                    #[allow(clippy::cast_possible_truncation)]
                    let body = PhysicsBody { handle: i as u32 };
                    scene.add_component(entity, body).unwrap();
                }
                for &entity in &entities {
                    black_box(scene.remove_component::<PhysicsBody>(entity).unwrap());
                }
                scene
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_toggle(c: &mut Criterion) {
    let (mut scene, entities) = populated_scene(10_000);

    c.bench_function("disable_enable_10k", |b| {
        b.iter(|| {
            for &entity in &entities {
                scene.disable(entity).unwrap();
            }
            for &entity in &entities {
                scene.enable(entity).unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_query_read,
    bench_query_write,
    bench_migration,
    bench_toggle,
);
criterion_main!(benches);
