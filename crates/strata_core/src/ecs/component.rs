//! # Component System
//!
//! Components are pure data containers with no behavior. They are `Pod`:
//! moving a component between rows or blocks is a byte copy, and a zeroed
//! slot is always a valid value. Types that need drop glue or hold
//! references cannot be components.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use strata_shared::{Mat4, Quat, Vec3};

use super::entity::Entity;

/// Width of the component ID space.
pub const MAX_COMPONENT_TYPES: usize = 256;

/// Numeric component type ID, assigned by registration order.
///
/// IDs are persisted by save data; reordering registrations breaks it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentTypeId(u8);

impl ComponentTypeId {
    /// Wraps a raw ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Raw ID value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// ID as an index into descriptor tables and signature bits.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Pod`: Plain old data; rows move by byte copy
/// - `Default`: The value a newly added component slot receives
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     const ID: ComponentTypeId = ComponentTypeId::new(BUILTIN_COMPONENT_COUNT);
///     const NAME: &'static str = "Health";
/// }
/// ```
pub trait Component: Pod + Default + Send + Sync + 'static {
    /// Stable ID; must equal the type's registration slot.
    const ID: ComponentTypeId;

    /// Human-readable name for tooling.
    const NAME: &'static str;

    /// The component holds a handle to a resource owned by a collaborator
    /// (physics body, GPU buffer). Listeners are told before its bytes are
    /// dropped so the resource is released exactly once.
    const OWNS_EXTERNAL_RESOURCE: bool = false;
}

/// Number of built-in component types; user IDs start here.
pub const BUILTIN_COMPONENT_COUNT: u8 = 7;

/// Local transform relative to the parent (or the world for roots).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Transform {
    /// Translation.
    pub position: Vec3,
    /// Rotation.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Identity rotation and scale at `position`.
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Affine matrix `T * R * S`.
    #[inline]
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Component for Transform {
    const ID: ComponentTypeId = ComponentTypeId::new(0);
    const NAME: &'static str = "Transform";
}

/// World-space transform written by the hierarchy pass.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct WorldTransform(pub Mat4);

impl Component for WorldTransform {
    const ID: ComponentTypeId = ComponentTypeId::new(1);
    const NAME: &'static str = "WorldTransform";
}

/// Parent link; the entity is placed under `parent` in the hierarchy.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Child {
    /// The parent entity.
    pub parent: Entity,
}

impl Default for Child {
    fn default() -> Self {
        Self {
            parent: Entity::INVALID,
        }
    }
}

impl Component for Child {
    const ID: ComponentTypeId = ComponentTypeId::new(2);
    const NAME: &'static str = "Child";
}

/// Renderer-side item handle; reacquired on every enable.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct RenderItem {
    /// Handle issued by the renderer.
    pub handle: u32,
}

impl Component for RenderItem {
    const ID: ComponentTypeId = ComponentTypeId::new(3);
    const NAME: &'static str = "RenderItem";
}

/// Physics engine body handle.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PhysicsBody {
    /// Handle issued by the physics engine.
    pub handle: u32,
}

impl Component for PhysicsBody {
    const ID: ComponentTypeId = ComponentTypeId::new(4);
    const NAME: &'static str = "PhysicsBody";
    const OWNS_EXTERNAL_RESOURCE: bool = true;
}

/// Perspective camera parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Camera {
    /// Vertical field of view in radians.
    pub vertical_fov: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            vertical_fov: std::f32::consts::FRAC_PI_4,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Component for Camera {
    const ID: ComponentTypeId = ComponentTypeId::new(5);
    const NAME: &'static str = "Camera";
}

/// Point light parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Light {
    /// Linear RGB color.
    pub color: Vec3,
    /// Luminous intensity.
    pub intensity: f32,
    /// Influence radius.
    pub range: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
        }
    }
}

impl Component for Light {
    const ID: ComponentTypeId = ComponentTypeId::new(6);
    const NAME: &'static str = "Light";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_follow_registration_order() {
        let ids = [
            Transform::ID,
            WorldTransform::ID,
            Child::ID,
            RenderItem::ID,
            PhysicsBody::ID,
            Camera::ID,
            Light::ID,
        ];
        for (slot, id) in ids.iter().enumerate() {
            assert_eq!(id.index(), slot);
        }
        assert_eq!(ids.len(), BUILTIN_COMPONENT_COUNT as usize);
    }

    #[test]
    fn test_component_sizes() {
        assert_eq!(std::mem::size_of::<Transform>(), 40);
        assert_eq!(std::mem::size_of::<WorldTransform>(), 64);
        assert_eq!(std::mem::size_of::<Child>(), 8);
    }

    #[test]
    fn test_transform_default_is_identity_matrix() {
        assert_eq!(Transform::default().to_matrix(), Mat4::IDENTITY);
        let moved = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(moved.to_matrix().translation(), Vec3::new(1.0, 2.0, 3.0));
    }
}
