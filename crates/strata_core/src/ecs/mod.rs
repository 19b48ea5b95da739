//! # Entity Component System
//!
//! Archetype storage: every entity lives in a block whose signature is
//! exactly its component set.
//!
//! ## Design Philosophy
//!
//! - Blocks are fixed-size slabs with one column per component
//! - Enabled rows are dense at the front, disabled rows packed at the back
//! - Entity handles carry a generation, stale handles never resolve
//! - Queries are resolved per block, never per entity

pub mod archetype;
pub mod block;
mod bundle;
mod component;
mod entity;
pub mod hierarchy;
pub mod query;
mod registry;
mod scene;
mod signature;

pub use archetype::{BlockId, BlockList, BlockStore};
pub use block::{BlockColumnsMut, BlockLayout, Column, EntityBlock, RowTransfer};
pub use bundle::ComponentBundle;
pub use component::{
    Camera, Child, Component, ComponentTypeId, Light, PhysicsBody, RenderItem, Transform,
    WorldTransform, BUILTIN_COMPONENT_COUNT, MAX_COMPONENT_TYPES,
};
pub use entity::{Entity, EntityData, EntityDirectory};
pub use hierarchy::{HierarchyEntry, TransformHierarchy};
pub use query::{QueryData, QueryIter, QueryIterMut, QueryView, QueryViewMut, ReadOnlyQueryData};
pub use registry::{ComponentDescriptor, ComponentRegistry};
pub use scene::{Scene, SceneListener, SceneStats};
pub use signature::Signature;
