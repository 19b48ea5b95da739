//! Randomized structural churn checked against a plain model.
//!
//! Deterministic: the operation stream comes from a seeded ChaCha8 RNG.

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_core::{
    BlockMatchPolicy, ComponentRegistry, Entity, Light, PhysicsBody, Scene, SceneConfig,
    Transform, Vec3,
};

#[derive(Clone, Copy, Debug)]
struct Model {
    x: f32,
    light: Option<f32>,
    body: Option<u32>,
    enabled: bool,
}

fn verify(scene: &Scene, model: &HashMap<Entity, Model>, dead: &[Entity]) {
    assert_eq!(scene.entity_count(), model.len());

    for (&entity, expected) in model {
        assert!(scene.is_entity_alive(entity));
        assert_eq!(scene.is_enabled(entity), Ok(expected.enabled));
        assert_eq!(scene.get::<Transform>(entity).unwrap().position.x, expected.x);
        assert_eq!(scene.get::<Light>(entity).ok().map(|l| l.intensity), expected.light);
        assert_eq!(scene.get::<PhysicsBody>(entity).ok().map(|b| b.handle), expected.body);

        let (block_id, row) = scene.directory().locate(entity).unwrap();
        let block = scene.blocks().get(block_id).unwrap();
        assert_eq!(block.entity_at(row), Some(entity));
    }
    for &entity in dead {
        assert!(!scene.is_entity_alive(entity));
    }

    for (_, block) in scene.blocks().iter() {
        assert!(block.entity_count() <= block.disabled_start());
        assert!(!block.is_empty());
    }

    let enabled = model.values().filter(|m| m.enabled).count();
    let lit = model
        .values()
        .filter(|m| m.enabled && m.light.is_some())
        .count();
    assert_eq!(scene.query::<&Transform>().iter().count(), enabled);
    assert_eq!(scene.query::<(&Transform, &Light)>().iter().count(), lit);
}

fn run_churn(seed: u64, policy: BlockMatchPolicy) {
    let config = SceneConfig {
        block_capacity: 16,
        block_bytes: 4096,
        max_blocks: 256,
        block_match: policy,
        ..SceneConfig::default()
    };
    let mut scene =
        Scene::new("churn", config, Arc::new(ComponentRegistry::with_builtins())).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut model: HashMap<Entity, Model> = HashMap::new();
    let mut live: Vec<Entity> = Vec::new();
    let mut dead: Vec<Entity> = Vec::new();

    for step in 0..4_000u32 {
        let op = if live.is_empty() { 0 } else { rng.gen_range(0..8) };
        match op {
            0 | 1 => {
                let x = step as f32;
                let entity = if rng.gen_bool(0.5) {
                    scene.spawn(Transform::from_position(Vec3::new(x, 0.0, 0.0)))
                } else {
                    scene.spawn((
                        Transform::from_position(Vec3::new(x, 0.0, 0.0)),
                        Light {
                            intensity: x,
                            ..Light::default()
                        },
                    ))
                }
                .unwrap();
                let light = scene.has::<Light>(entity).then_some(x);
                model.insert(
                    entity,
                    Model {
                        x,
                        light,
                        body: None,
                        enabled: true,
                    },
                );
                live.push(entity);
            }
            2 => {
                let entity = live.swap_remove(rng.gen_range(0..live.len()));
                scene.destroy_entity(entity).unwrap();
                model.remove(&entity);
                dead.push(entity);
            }
            3 => {
                let entity = live[rng.gen_range(0..live.len())];
                let state = model.get_mut(&entity).unwrap();
                if state.enabled {
                    scene.disable(entity).unwrap();
                } else {
                    scene.enable(entity).unwrap();
                }
                state.enabled = !state.enabled;
            }
            4 => {
                let entity = live[rng.gen_range(0..live.len())];
                let state = model.get_mut(&entity).unwrap();
                if state.light.is_some() {
                    scene.remove_component::<Light>(entity).unwrap();
                    state.light = None;
                } else {
                    scene.add_component(entity, Light::default()).unwrap();
                    state.light = Some(Light::default().intensity);
                }
            }
            5 => {
                let entity = live[rng.gen_range(0..live.len())];
                let state = model.get_mut(&entity).unwrap();
                if state.body.is_some() {
                    scene.remove_component::<PhysicsBody>(entity).unwrap();
                    state.body = None;
                } else {
                    scene
                        .add_component(entity, PhysicsBody { handle: step })
                        .unwrap();
                    state.body = Some(step);
                }
            }
            _ => {
                let entity = live[rng.gen_range(0..live.len())];
                let x = rng.gen_range(-100.0f32..100.0);
                scene.get_mut::<Transform>(entity).unwrap().position.x = x;
                model.get_mut(&entity).unwrap().x = x;
            }
        }

        if step % 250 == 0 {
            verify(&scene, &model, &dead);
        }
    }
    verify(&scene, &model, &dead);
}

#[test]
fn test_churn_first_fit() {
    run_churn(0x5EED, BlockMatchPolicy::FirstFit);
}

#[test]
fn test_churn_most_occupied() {
    run_churn(0xC0FFEE, BlockMatchPolicy::MostOccupied);
}

#[test]
fn test_churn_other_seeds() {
    for seed in 1..4 {
        run_churn(seed, BlockMatchPolicy::FirstFit);
    }
}
