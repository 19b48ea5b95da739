//! Integration tests for transform hierarchy insertion, propagation and
//! pruning.

use strata_core::{
    Child, EcsError, Entity, Mat4, Quat, Scene, Transform, Vec3, WorldTransform,
};

const EPSILON: f32 = 1e-5;

fn spawn_child(scene: &mut Scene, parent: Entity, local: Transform) -> Entity {
    scene.spawn((local, Child { parent })).unwrap()
}

/// root (0,0,0) -> child (1,0,0) -> grandchild (0,1,0)
fn build_chain(scene: &mut Scene) -> (Entity, Entity, Entity) {
    let root = scene.spawn(Transform::IDENTITY).unwrap();
    let child = spawn_child(scene, root, Transform::from_position(Vec3::X));
    let grandchild = spawn_child(scene, child, Transform::from_position(Vec3::Y));
    (root, child, grandchild)
}

#[test]
fn test_grandchild_translation() {
    let mut scene = Scene::with_defaults("chain");
    let (root, child, grandchild) = build_chain(&mut scene);

    scene.add_to_hierarchy(grandchild).unwrap();
    assert_eq!(scene.hierarchy().len(), 3);
    assert_eq!(scene.hierarchy().depth_of(root), Some(0));
    assert_eq!(scene.hierarchy().depth_of(child), Some(1));
    assert_eq!(scene.hierarchy().depth_of(grandchild), Some(2));

    scene.update_hierarchy();
    let world = scene.world_transform(grandchild).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), EPSILON));
}

#[test]
fn test_three_level_composition() {
    let mut scene = Scene::with_defaults("compose");
    let root_local = Transform {
        position: Vec3::new(2.0, 0.0, -1.0),
        rotation: Quat::from_axis_angle(Vec3::Y, 0.7),
        scale: Vec3::new(2.0, 2.0, 2.0),
    };
    let child_local = Transform {
        position: Vec3::new(0.0, 3.0, 0.0),
        rotation: Quat::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_2),
        scale: Vec3::ONE,
    };
    let grandchild_local = Transform {
        position: Vec3::new(1.0, 0.0, 0.5),
        rotation: Quat::from_axis_angle(Vec3::X, -0.3),
        scale: Vec3::new(0.5, 1.0, 1.5),
    };

    let root = scene.spawn((root_local, WorldTransform::default())).unwrap();
    let child = spawn_child(&mut scene, root, child_local);
    let grandchild = scene
        .spawn((grandchild_local, Child { parent: child }, WorldTransform::default()))
        .unwrap();
    scene.add_to_hierarchy(grandchild).unwrap();
    scene.update_hierarchy();

    let expected: Mat4 = root_local.to_matrix() * child_local.to_matrix() * grandchild_local.to_matrix();
    let world = scene.world_transform(grandchild).unwrap();
    assert!(world.abs_diff_eq(&expected, EPSILON));

    // Members carrying a WorldTransform component get it written.
    let written = scene.get::<WorldTransform>(grandchild).unwrap().0;
    assert!(written.abs_diff_eq(&expected, EPSILON));
    let root_written = scene.get::<WorldTransform>(root).unwrap().0;
    assert!(root_written.abs_diff_eq(&root_local.to_matrix(), EPSILON));
}

#[test]
fn test_levels_stay_sorted_by_parent() {
    let mut scene = Scene::with_defaults("sorted");
    let a = scene.spawn(Transform::IDENTITY).unwrap();
    let b = scene.spawn(Transform::IDENTITY).unwrap();
    scene.add_to_hierarchy(a).unwrap();
    scene.add_to_hierarchy(b).unwrap();

    let b0 = spawn_child(&mut scene, b, Transform::from_position(Vec3::X));
    let a0 = spawn_child(&mut scene, a, Transform::from_position(Vec3::Y));
    let b0x = spawn_child(&mut scene, b0, Transform::from_position(Vec3::Z));
    scene.add_to_hierarchy(b0x).unwrap();
    scene.add_to_hierarchy(a0).unwrap();

    let level1 = scene.hierarchy().level(1);
    assert_eq!(level1.iter().map(|e| e.entity).collect::<Vec<_>>(), vec![a0, b0]);
    assert!(level1.windows(2).all(|w| w[0].parent_idx <= w[1].parent_idx));
    // b0 moved from index 0 to 1; its child must follow.
    assert_eq!(scene.hierarchy().level(2)[0].parent_idx, 1);

    scene.update_hierarchy();
    let world = scene.world_transform(b0x).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), EPSILON));
    let world = scene.world_transform(a0).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::Y, EPSILON));
    // b0 was shifted by the a0 insert; its lookup follows.
    let world = scene.world_transform(b0).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::X, EPSILON));
}

#[test]
fn test_previous_transform_lags_one_update() {
    let mut scene = Scene::with_defaults("motion");
    let entity = scene.spawn(Transform::from_position(Vec3::X)).unwrap();
    scene.add_to_hierarchy(entity).unwrap();

    scene.update_hierarchy();
    assert_eq!(scene.previous_transform(entity), None);

    scene.get_mut::<Transform>(entity).unwrap().position = Vec3::Z;
    scene.update_hierarchy();
    let previous = scene.previous_transform(entity).unwrap();
    assert!(previous.translation().abs_diff_eq(Vec3::X, EPSILON));
    let current = scene.world_transform(entity).unwrap();
    assert!(current.translation().abs_diff_eq(Vec3::Z, EPSILON));
}

#[test]
fn test_propagation_follows_migration() {
    let mut scene = Scene::with_defaults("migrate");
    let (root, _, grandchild) = build_chain(&mut scene);
    scene.add_to_hierarchy(grandchild).unwrap();

    // Moves root into another block; the hierarchy resolves it by handle.
    scene.add_component(root, WorldTransform::default()).unwrap();
    scene.get_mut::<Transform>(root).unwrap().position = Vec3::new(0.0, 0.0, 5.0);
    scene.update_hierarchy();

    let world = scene.world_transform(grandchild).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::new(1.0, 1.0, 5.0), EPSILON));
}

#[test]
fn test_insert_errors_leave_hierarchy_untouched() {
    let mut scene = Scene::with_defaults("errors");

    let a = scene.spawn(Transform::IDENTITY).unwrap();
    let b = spawn_child(&mut scene, a, Transform::IDENTITY);
    scene.add_component(a, Child { parent: b }).unwrap();
    assert!(matches!(
        scene.add_to_hierarchy(b),
        Err(EcsError::HierarchyCycle(_))
    ));
    assert!(scene.hierarchy().is_empty());

    let bare = scene.spawn(Child::default()).unwrap();
    assert_eq!(
        scene.add_to_hierarchy(bare),
        Err(EcsError::HierarchyMissingTransform(bare))
    );

    let parent = scene.spawn(Transform::IDENTITY).unwrap();
    let orphan = spawn_child(&mut scene, parent, Transform::IDENTITY);
    scene.destroy_entity(parent).unwrap();
    assert_eq!(
        scene.add_to_hierarchy(orphan),
        Err(EcsError::HierarchyParentNotAlive { child: orphan, parent })
    );

    scene.destroy_entity(orphan).unwrap();
    assert_eq!(
        scene.add_to_hierarchy(orphan),
        Err(EcsError::StaleEntity(orphan))
    );
    assert!(scene.hierarchy().is_empty());
}

#[test]
fn test_insert_is_idempotent() {
    let mut scene = Scene::with_defaults("twice");
    let (_, child, grandchild) = build_chain(&mut scene);
    scene.add_to_hierarchy(grandchild).unwrap();
    scene.add_to_hierarchy(grandchild).unwrap();
    scene.add_to_hierarchy(child).unwrap();
    assert_eq!(scene.hierarchy().len(), 3);
    assert_eq!(scene.hierarchy().depth(), 3);
}

#[test]
fn test_deferred_insert_waits_for_end_frame() {
    let mut scene = Scene::with_defaults("deferred");
    let (_, _, grandchild) = build_chain(&mut scene);
    let dangling = scene.spawn(Child { parent: Entity::new(999, 1) }).unwrap();

    scene.queue_hierarchy_insert(grandchild);
    scene.queue_hierarchy_insert(dangling);
    assert!(scene.hierarchy().is_empty());
    assert_eq!(scene.hierarchy().pending_count(), 2);

    scene.end_frame();
    assert_eq!(scene.hierarchy().pending_count(), 0);
    assert_eq!(scene.hierarchy().len(), 3);
    assert!(!scene.hierarchy().contains(dangling));
    assert_eq!(scene.stats().frame, 1);
}

#[test]
fn test_end_frame_prunes_dead_subtrees() {
    let mut scene = Scene::with_defaults("prune");
    let (root, child, grandchild) = build_chain(&mut scene);
    let sibling = spawn_child(&mut scene, root, Transform::from_position(Vec3::Z));
    let nephew = spawn_child(&mut scene, sibling, Transform::from_position(Vec3::X));
    scene.add_to_hierarchy(grandchild).unwrap();
    scene.add_to_hierarchy(nephew).unwrap();
    assert_eq!(scene.hierarchy().len(), 5);

    scene.destroy_entity(child).unwrap();
    // Until the prune the dead member only passes its parent's matrix on.
    scene.update_hierarchy();
    let world = scene.world_transform(grandchild).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::Y, EPSILON));

    scene.end_frame();
    assert_eq!(scene.hierarchy().len(), 3);
    assert!(!scene.hierarchy().contains(child));
    assert!(!scene.hierarchy().contains(grandchild));
    assert_eq!(scene.hierarchy().level(1).len(), 1);
    assert_eq!(scene.hierarchy().level(2)[0].parent_idx, 0);

    scene.update_hierarchy();
    let world = scene.world_transform(nephew).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), EPSILON));
}

#[test]
fn test_prune_keeps_archive_of_recycled_index() {
    let mut scene = Scene::with_defaults("recycle");
    let a = scene.spawn(Transform::from_position(Vec3::X)).unwrap();
    scene.add_to_hierarchy(a).unwrap();
    scene.update_hierarchy();
    scene.destroy_entity(a).unwrap();

    let b = scene.spawn(Transform::from_position(Vec3::Y)).unwrap();
    assert_eq!(b.index(), a.index());
    scene.add_to_hierarchy(b).unwrap();
    scene.update_hierarchy();
    scene.update_hierarchy();
    assert!(scene.previous_transform(b).is_some());

    scene.end_frame();
    assert!(!scene.hierarchy().contains(a));
    let previous = scene.previous_transform(b).unwrap();
    assert!(previous.translation().abs_diff_eq(Vec3::Y, EPSILON));
    let world = scene.world_transform(b).unwrap();
    assert!(world.translation().abs_diff_eq(Vec3::Y, EPSILON));
}

#[test]
fn test_unload_clears_hierarchy() {
    let mut scene = Scene::with_defaults("unload");
    let (_, _, grandchild) = build_chain(&mut scene);
    scene.add_to_hierarchy(grandchild).unwrap();
    scene.update_hierarchy();

    scene.unload();
    assert!(scene.hierarchy().is_empty());
    assert_eq!(scene.world_transform(grandchild), None);
    assert_eq!(scene.stats().hierarchy_depth, 0);
}
