//! # Storage Error Types
//!
//! All recoverable errors raised at the public boundary of the storage core.
//! Internal invariants remain debug assertions.

use thiserror::Error;

use crate::ecs::{ComponentTypeId, Entity};

/// Errors that can occur in the entity/component store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The handle is `INVALID`, was destroyed, or its index was reused.
    #[error("entity {0} is not alive")]
    StaleEntity(Entity),

    /// The entity's signature does not contain the component.
    #[error("entity {entity} has no component {component}")]
    MissingComponent {
        /// The entity that was accessed.
        entity: Entity,
        /// The requested component type.
        component: ComponentTypeId,
    },

    /// The entity already carries the component.
    #[error("entity {entity} already has component {component}")]
    ComponentAlreadyPresent {
        /// The entity that was accessed.
        entity: Entity,
        /// The component type being added.
        component: ComponentTypeId,
    },

    /// A spawned bundle names the same component twice.
    #[error("bundle contains component {0} more than once")]
    DuplicateBundleComponent(ComponentTypeId),

    /// No descriptor registered under this component ID.
    #[error("component {0} is not registered")]
    UnregisteredComponent(ComponentTypeId),

    /// Component IDs must follow registration order.
    #[error("component {name} declares id {declared} but registration slot is {expected}")]
    RegistrationOrder {
        /// Component name.
        name: &'static str,
        /// ID declared by the type.
        declared: u16,
        /// Next free registration slot.
        expected: u16,
    },

    /// Component layout cannot be stored in a block.
    #[error("component {name} has unsupported layout (size {size}, align {align})")]
    UnsupportedLayout {
        /// Component name.
        name: &'static str,
        /// Size in bytes.
        size: usize,
        /// Alignment in bytes.
        align: usize,
    },

    /// All 256 component IDs are taken.
    #[error("component registry is full")]
    RegistryFull,

    /// The signature does not fit into one slab buffer at the configured capacity.
    #[error("block layout needs {required} bytes, slab buffers hold {available}")]
    LayoutTooLarge {
        /// Bytes required by the layout.
        required: usize,
        /// Bytes available per slab buffer.
        available: usize,
    },

    /// The block header pool has no free slot.
    #[error("block pool exhausted: {capacity} blocks in use")]
    OutOfBlocks {
        /// Pool capacity.
        capacity: usize,
    },

    /// The slab allocator has no free payload buffer.
    #[error("slab exhausted: {capacity} buffers in use")]
    OutOfSlabs {
        /// Slab capacity.
        capacity: usize,
    },

    /// A mutable query names the same component more than once.
    #[error("query borrows component {0} more than once")]
    AliasedQuery(ComponentTypeId),

    /// No live entity carries the singleton component.
    #[error("no entity carries singleton component {0}")]
    NoSingleton(ComponentTypeId),

    /// Parent chain loops back onto itself.
    #[error("hierarchy cycle through entity {0}")]
    HierarchyCycle(Entity),

    /// Hierarchy members need a `Transform`.
    #[error("entity {0} has no transform and cannot join the hierarchy")]
    HierarchyMissingTransform(Entity),

    /// A `Child` component points at a dead entity.
    #[error("entity {child} has a dead parent {parent}")]
    HierarchyParentNotAlive {
        /// The child entity.
        child: Entity,
        /// The stale parent handle.
        parent: Entity,
    },

    /// Component has no serialization hooks.
    #[error("component {0} is not serializable")]
    NotSerializable(ComponentTypeId),

    /// Serialization hook failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),
}

/// Result type for storage operations.
pub type EcsResult<T> = Result<T, EcsError>;
