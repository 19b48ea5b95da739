//! # STRATA Core
//!
//! Archetype entity/component storage for a game engine scene:
//! - Entities grouped into fixed-size blocks by exact component set
//! - Dense per-block columns, iterated block by block
//! - Enable/disable without losing component data
//! - Depth-leveled transform hierarchy
//!
//! ## Architecture Rules
//!
//! 1. **One writer** - structural mutation needs `&mut Scene`
//! 2. **Blocks are recycled** - payloads come from a fixed slab, never the
//!    system allocator
//! 3. **Handles are checked** - every access validates the generation
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{Scene, Transform, Light};
//!
//! let mut scene = Scene::with_defaults("level_01");
//! let lamp = scene.spawn((Transform::IDENTITY, Light::default()))?;
//! for (entity, light) in scene.query::<&Light>().iter() {
//!     println!("{entity}: {}", light.intensity);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;

pub use config::{BlockMatchPolicy, SceneConfig};
pub use ecs::{
    BlockId, BlockStore, Camera, Child, Component, ComponentBundle, ComponentDescriptor,
    ComponentRegistry, ComponentTypeId, Entity, EntityBlock, Light, PhysicsBody, QueryView,
    QueryViewMut, RenderItem, Scene, SceneListener, SceneStats, Signature, Transform,
    TransformHierarchy, WorldTransform,
};
pub use error::{EcsError, EcsResult};
pub use memory::{PoolAllocator, PoolHandle, SlabAllocator};
pub use strata_shared::{Mat4, Quat, Vec3};
