//! # Component Registry
//!
//! The closed table of component descriptors: size, alignment, default
//! value and optional (de)serialization hooks for each component ID. The
//! storage core only needs size, alignment and default; the hooks serve
//! tooling (inspector, save/load).

use std::any::TypeId;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::component::{
    Camera, Child, Component, ComponentTypeId, Light, PhysicsBody, RenderItem, Transform,
    WorldTransform, MAX_COMPONENT_TYPES,
};
use crate::error::{EcsError, EcsResult};
use crate::memory::CACHE_LINE;

/// Serialization hook: component bytes to a TOML value.
pub type SerializeFn = fn(&[u8]) -> EcsResult<toml::Value>;

/// Deserialization hook: TOML value into component bytes.
pub type DeserializeFn = fn(&toml::Value, &mut [u8]) -> EcsResult<()>;

/// Runtime description of one component type.
#[derive(Clone, Copy, Debug)]
pub struct ComponentDescriptor {
    /// Component ID.
    pub id: ComponentTypeId,
    /// Type name.
    pub name: &'static str,
    /// Rust type backing the ID; typed accessors check it.
    pub type_id: TypeId,
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub align: usize,
    /// See [`Component::OWNS_EXTERNAL_RESOURCE`].
    pub owns_external_resource: bool,
    write_default: fn(&mut [u8]),
    serialize: Option<SerializeFn>,
    deserialize: Option<DeserializeFn>,
}

impl ComponentDescriptor {
    /// Descriptor without serialization hooks.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            id: C::ID,
            name: C::NAME,
            type_id: TypeId::of::<C>(),
            size: std::mem::size_of::<C>(),
            align: std::mem::align_of::<C>(),
            owns_external_resource: C::OWNS_EXTERNAL_RESOURCE,
            write_default: write_default::<C>,
            serialize: None,
            deserialize: None,
        }
    }

    /// Descriptor with serde-backed hooks.
    #[must_use]
    pub fn serializable<C: Component + Serialize + DeserializeOwned>() -> Self {
        Self {
            serialize: Some(serialize_component::<C>),
            deserialize: Some(deserialize_component::<C>),
            ..Self::of::<C>()
        }
    }

    /// Whether `C` is the type registered under this ID.
    #[inline]
    #[must_use]
    pub fn is<C: Component>(&self) -> bool {
        self.type_id == TypeId::of::<C>()
    }

    /// Writes the default value into `bytes` (exactly `size` long).
    #[inline]
    pub fn write_default(&self, bytes: &mut [u8]) {
        (self.write_default)(bytes);
    }

    /// Whether serialization hooks are present.
    #[must_use]
    pub fn is_serializable(&self) -> bool {
        self.serialize.is_some() && self.deserialize.is_some()
    }

    /// Runs the serialization hook.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotSerializable`] without hooks, otherwise the hook's error.
    pub fn serialize(&self, bytes: &[u8]) -> EcsResult<toml::Value> {
        let hook = self.serialize.ok_or(EcsError::NotSerializable(self.id))?;
        hook(bytes)
    }

    /// Runs the deserialization hook.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotSerializable`] without hooks, otherwise the hook's error.
    pub fn deserialize(&self, value: &toml::Value, bytes: &mut [u8]) -> EcsResult<()> {
        let hook = self.deserialize.ok_or(EcsError::NotSerializable(self.id))?;
        hook(value, bytes)
    }
}

fn write_default<C: Component>(bytes: &mut [u8]) {
    bytes.copy_from_slice(bytemuck::bytes_of(&C::default()));
}

fn serialize_component<C: Component + Serialize>(bytes: &[u8]) -> EcsResult<toml::Value> {
    let value: C = bytemuck::pod_read_unaligned(bytes);
    toml::Value::try_from(value).map_err(|e| EcsError::Serialization(e.to_string()))
}

fn deserialize_component<C: Component + DeserializeOwned>(
    value: &toml::Value,
    bytes: &mut [u8],
) -> EcsResult<()> {
    let component: C = value
        .clone()
        .try_into()
        .map_err(|e: toml::de::Error| EcsError::Serialization(e.to_string()))?;
    bytes.copy_from_slice(bytemuck::bytes_of(&component));
    Ok(())
}

/// Descriptor table indexed by component ID.
#[derive(Clone, Debug, Default)]
pub struct ComponentRegistry {
    descriptors: Vec<ComponentDescriptor>,
}

impl ComponentRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: Vec::with_capacity(MAX_COMPONENT_TYPES),
        }
    }

    /// Registry holding the built-in components, in their fixed order.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in [
            ComponentDescriptor::serializable::<Transform>(),
            ComponentDescriptor::serializable::<WorldTransform>(),
            ComponentDescriptor::serializable::<Child>(),
            ComponentDescriptor::serializable::<RenderItem>(),
            ComponentDescriptor::serializable::<PhysicsBody>(),
            ComponentDescriptor::serializable::<Camera>(),
            ComponentDescriptor::serializable::<Light>(),
        ] {
            debug_assert_eq!(descriptor.id.index(), registry.descriptors.len());
            registry.descriptors.push(descriptor);
        }
        registry
    }

    /// Appends a component type without serialization hooks.
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    pub fn register<C: Component>(&mut self) -> EcsResult<ComponentTypeId> {
        self.insert(ComponentDescriptor::of::<C>())
    }

    /// Appends a component type with serde-backed hooks.
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    pub fn register_serializable<C>(&mut self) -> EcsResult<ComponentTypeId>
    where
        C: Component + Serialize + DeserializeOwned,
    {
        self.insert(ComponentDescriptor::serializable::<C>())
    }

    /// Appends a descriptor.
    ///
    /// # Errors
    ///
    /// - [`EcsError::RegistryFull`] once 256 types are registered
    /// - [`EcsError::RegistrationOrder`] if the ID is not the next free slot
    /// - [`EcsError::UnsupportedLayout`] for zero-sized or over-aligned types
    pub fn insert(&mut self, descriptor: ComponentDescriptor) -> EcsResult<ComponentTypeId> {
        let slot = self.descriptors.len();
        if slot >= MAX_COMPONENT_TYPES {
            return Err(EcsError::RegistryFull);
        }
        if descriptor.id.index() != slot {
            return Err(EcsError::RegistrationOrder {
                name: descriptor.name,
                declared: u16::from(descriptor.id.value()),
                expected: u16::try_from(slot).unwrap_or(u16::MAX),
            });
        }
        if descriptor.size == 0 || descriptor.align > CACHE_LINE {
            return Err(EcsError::UnsupportedLayout {
                name: descriptor.name,
                size: descriptor.size,
                align: descriptor.align,
            });
        }
        self.descriptors.push(descriptor);
        Ok(descriptor.id)
    }

    /// Descriptor for `id`, if registered.
    #[inline]
    #[must_use]
    pub fn get(&self, id: ComponentTypeId) -> Option<&ComponentDescriptor> {
        self.descriptors.get(id.index())
    }

    /// Descriptor for `id`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredComponent`] if absent.
    pub fn descriptor(&self, id: ComponentTypeId) -> EcsResult<&ComponentDescriptor> {
        self.get(id).ok_or(EcsError::UnregisteredComponent(id))
    }

    /// Looks a descriptor up by type name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.descriptors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::BUILTIN_COMPONENT_COUNT;
    use bytemuck::{Pod, Zeroable};
    use serde::Deserialize;
    use strata_shared::Vec3;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
    struct Health {
        current: f32,
        max: f32,
    }

    impl Component for Health {
        const ID: ComponentTypeId = ComponentTypeId::new(BUILTIN_COMPONENT_COUNT);
        const NAME: &'static str = "Health";
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    struct Misnumbered {
        value: u32,
    }

    impl Component for Misnumbered {
        const ID: ComponentTypeId = ComponentTypeId::new(42);
        const NAME: &'static str = "Misnumbered";
    }

    #[test]
    fn test_builtins_registered_in_order() {
        let registry = ComponentRegistry::with_builtins();
        assert_eq!(registry.len(), BUILTIN_COMPONENT_COUNT as usize);
        let transform = registry.descriptor(Transform::ID).unwrap();
        assert_eq!(transform.size, 40);
        assert!(registry.descriptor(PhysicsBody::ID).unwrap().owns_external_resource);
        assert_eq!(registry.find_by_name("Light").map(|d| d.id), Some(Light::ID));
    }

    #[test]
    fn test_registration_order_is_enforced() {
        let mut registry = ComponentRegistry::with_builtins();
        let err = registry.register::<Misnumbered>().unwrap_err();
        assert!(matches!(err, EcsError::RegistrationOrder { declared: 42, expected: 7, .. }));

        assert_eq!(registry.register_serializable::<Health>().unwrap(), Health::ID);
        // Registering twice collides with the next slot.
        assert!(registry.register::<Health>().is_err());
    }

    #[test]
    fn test_default_and_serialization_hooks() {
        let registry = ComponentRegistry::with_builtins();
        let descriptor = registry.descriptor(Light::ID).unwrap();

        let mut bytes = vec![0u8; descriptor.size];
        descriptor.write_default(&mut bytes);
        let light: Light = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(light, Light::default());

        let edited = Light {
            color: Vec3::new(1.0, 0.5, 0.25),
            intensity: 3.0,
            range: 4.0,
        };
        let value = descriptor.serialize(bytemuck::bytes_of(&edited)).unwrap();
        descriptor.deserialize(&value, &mut bytes).unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<Light>(&bytes), edited);
    }

    #[test]
    fn test_plain_descriptor_is_not_serializable() {
        let descriptor = ComponentDescriptor::of::<Health>();
        assert!(!descriptor.is_serializable());
        assert_eq!(
            descriptor.serialize(&[0; 8]).unwrap_err(),
            EcsError::NotSerializable(Health::ID)
        );
    }
}
