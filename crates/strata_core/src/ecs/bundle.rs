//! # Component Bundles
//!
//! A bundle is a set of component values spawned together, usually a
//! tuple such as `(Transform, Light)`. Its signature selects the block;
//! its values overwrite the defaults written by the block push.

use super::block::EntityBlock;
use super::component::{Component, ComponentTypeId};
use super::registry::ComponentRegistry;
use super::signature::Signature;
use crate::error::{EcsError, EcsResult};

/// Components that can be spawned together as one unit.
pub trait ComponentBundle: Send + Sync + 'static {
    /// Appends the bundle's component IDs in declaration order.
    fn component_ids(out: &mut Vec<ComponentTypeId>);

    /// Signature of the bundle.
    fn signature() -> Signature {
        let mut ids = Vec::new();
        Self::component_ids(&mut ids);
        Signature::from_ids(&ids)
    }

    /// Checks that every component ID is registered for the bundle's own type.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredComponent`] for the first mismatch.
    fn check(registry: &ComponentRegistry) -> EcsResult<()>;

    /// Writes the values into `row` of `block`.
    ///
    /// The block's signature must contain every component of the bundle.
    fn write(self, block: &mut EntityBlock, row: usize);
}

impl<C: Component> ComponentBundle for C {
    fn component_ids(out: &mut Vec<ComponentTypeId>) {
        out.push(C::ID);
    }

    fn check(registry: &ComponentRegistry) -> EcsResult<()> {
        if registry.descriptor(C::ID)?.is::<C>() {
            Ok(())
        } else {
            Err(EcsError::UnregisteredComponent(C::ID))
        }
    }

    fn write(self, block: &mut EntityBlock, row: usize) {
        let slot = block.component_mut::<C>(row);
        debug_assert!(slot.is_some(), "Block lacks bundle component {}", C::NAME);
        if let Some(slot) = slot {
            *slot = self;
        }
    }
}

macro_rules! impl_bundle_tuple {
    ($($name:ident $value:ident),+) => {
        impl<$($name: ComponentBundle),+> ComponentBundle for ($($name,)+) {
            fn component_ids(out: &mut Vec<ComponentTypeId>) {
                $($name::component_ids(out);)+
            }

            fn check(registry: &ComponentRegistry) -> EcsResult<()> {
                $($name::check(registry)?;)+
                Ok(())
            }

            fn write(self, block: &mut EntityBlock, row: usize) {
                let ($($value,)+) = self;
                $($value.write(block, row);)+
            }
        }
    };
}

impl_bundle_tuple!(A a);
impl_bundle_tuple!(A a, B b);
impl_bundle_tuple!(A a, B b, C c);
impl_bundle_tuple!(A a, B b, C c, D d);
impl_bundle_tuple!(A a, B b, C c, D d, E e);
impl_bundle_tuple!(A a, B b, C c, D d, E e, F f);
impl_bundle_tuple!(A a, B b, C c, D d, E e, F f, G g);
impl_bundle_tuple!(A a, B b, C c, D d, E e, F f, G g, H h);
