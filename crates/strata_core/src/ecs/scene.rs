//! # Scene
//!
//! The scene owns everything the storage core knows about one world: the
//! block store, the entity directory and the transform hierarchy. All
//! structural mutation goes through `&mut Scene`, so there is exactly one
//! writer and no view can observe a half-finished change.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut scene = Scene::with_defaults("level_01");
//! let root = scene.spawn(Transform::IDENTITY)?;
//! let child = scene.spawn((Transform::from_position(Vec3::X), Child { parent: root }))?;
//! scene.add_to_hierarchy(child)?;
//!
//! for (_, transform) in scene.query_mut::<&mut Transform>()?.iter_mut() {
//!     transform.position.y += 1.0;
//! }
//! scene.update_hierarchy();
//! scene.end_frame();
//! ```

use std::sync::Arc;

use strata_shared::Mat4;

use super::archetype::{BlockId, BlockList, BlockStore};
use super::block::EntityBlock;
use super::bundle::ComponentBundle;
use super::component::{Component, ComponentTypeId};
use super::entity::{Entity, EntityDirectory};
use super::hierarchy::TransformHierarchy;
use super::query::{first_duplicate, QueryData, QueryView, QueryViewMut, ReadOnlyQueryData};
use super::registry::ComponentRegistry;
use super::signature::Signature;
use crate::config::SceneConfig;
use crate::error::{EcsError, EcsResult};

/// Collaborator hooks (renderer, physics) for state the core does not own.
///
/// Every method defaults to a no-op.
pub trait SceneListener: Send + Sync {
    /// The entity moved into the enabled partition; renderable state should
    /// be acquired again.
    fn entity_enabled(&mut self, _entity: Entity, _signature: &Signature) {}

    /// The entity moved into the disabled partition.
    fn entity_disabled(&mut self, _entity: Entity, _signature: &Signature) {}

    /// The entity is about to be destroyed.
    fn entity_destroyed(&mut self, _entity: Entity, _signature: &Signature) {}

    /// Bytes of a component flagged `OWNS_EXTERNAL_RESOURCE` are about to be
    /// dropped; release whatever they refer to.
    fn resource_released(&mut self, _entity: Entity, _component: ComponentTypeId, _bytes: &[u8]) {}
}

/// Point-in-time counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    /// Live entities.
    pub alive_entities: usize,
    /// Directory records, live or dead.
    pub directory_records: usize,
    /// Live blocks.
    pub blocks: usize,
    /// Slab buffers owned by blocks.
    pub slab_buffers: usize,
    /// Block store generation.
    pub generation: u64,
    /// Cached query signatures.
    pub cached_queries: usize,
    /// Hierarchy members.
    pub hierarchy_members: usize,
    /// Hierarchy levels.
    pub hierarchy_depth: usize,
    /// Completed frames.
    pub frame: u64,
}

/// One world of entities.
pub struct Scene {
    name: String,
    config: SceneConfig,
    registry: Arc<ComponentRegistry>,
    store: BlockStore,
    directory: EntityDirectory,
    hierarchy: TransformHierarchy,
    listeners: Vec<Box<dyn SceneListener>>,
    frame: u64,
}

impl Scene {
    /// Creates an empty scene.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        name: impl Into<String>,
        config: SceneConfig,
        registry: Arc<ComponentRegistry>,
    ) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(name.into(), config, registry))
    }

    /// Scene with the default configuration and the built-in components.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::build(
            name.into(),
            SceneConfig::default(),
            Arc::new(ComponentRegistry::with_builtins()),
        )
    }

    fn build(name: String, config: SceneConfig, registry: Arc<ComponentRegistry>) -> Self {
        tracing::debug!(
            scene = %name,
            block_capacity = config.block_capacity,
            block_bytes = config.block_bytes,
            max_blocks = config.max_blocks,
            "Scene created"
        );
        Self {
            store: BlockStore::new(&config),
            directory: EntityDirectory::new(config.recycle_entity_indices),
            hierarchy: TransformHierarchy::new(),
            listeners: Vec::new(),
            frame: 0,
            name,
            config,
            registry,
        }
    }

    /// Scene name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Component registry shared with tooling.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Block store, read-only.
    #[must_use]
    pub fn blocks(&self) -> &BlockStore {
        &self.store
    }

    /// Entity directory, read-only.
    #[must_use]
    pub fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    /// Transform hierarchy, read-only.
    #[must_use]
    pub fn hierarchy(&self) -> &TransformHierarchy {
        &self.hierarchy
    }

    /// Registers a collaborator.
    pub fn add_listener(&mut self, listener: Box<dyn SceneListener>) {
        self.listeners.push(listener);
    }

    // ========================================================================
    // ENTITY LIFECYCLE
    // ========================================================================

    /// Creates an enabled entity with default values for every component
    /// in `signature`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredComponent`], [`EcsError::LayoutTooLarge`],
    /// [`EcsError::OutOfBlocks`] or [`EcsError::OutOfSlabs`].
    pub fn create_entity(&mut self, signature: &Signature) -> EcsResult<Entity> {
        self.place_new(*signature).map(|(entity, _, _)| entity)
    }

    /// Creates an enabled entity from a bundle of component values.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateBundleComponent`] if the bundle repeats a
    /// component, otherwise as [`create_entity`](Self::create_entity).
    pub fn spawn<B: ComponentBundle>(&mut self, bundle: B) -> EcsResult<Entity> {
        let mut ids = Vec::new();
        B::component_ids(&mut ids);
        let signature = Signature::from_ids(&ids);
        if signature.len() != ids.len() {
            let mut seen = Signature::EMPTY;
            let duplicate = ids.iter().copied().find(|&id| {
                let repeated = seen.contains(id);
                seen.insert(id);
                repeated
            });
            return Err(EcsError::DuplicateBundleComponent(
                duplicate.unwrap_or(ComponentTypeId::new(0)),
            ));
        }
        B::check(&self.registry)?;

        let (entity, block, row) = self.place_new(signature)?;
        if let Some(block) = self.store.get_mut(block) {
            bundle.write(block, row);
        }
        Ok(entity)
    }

    fn place_new(&mut self, signature: Signature) -> EcsResult<(Entity, BlockId, usize)> {
        let entity = self.directory.reserve();
        match self.store.insert(signature, &self.registry, entity) {
            Ok((block, row)) => {
                self.directory.place(entity, block, row);
                Ok((entity, block, row))
            }
            Err(error) => {
                self.directory.abandon(entity);
                Err(error)
            }
        }
    }

    /// Destroys a live entity.
    ///
    /// Listeners see `entity_destroyed`, then `resource_released` for each
    /// component owning an external resource. The block is destroyed when
    /// its last entity leaves.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let (block_id, row, enabled) = self.location(entity)?;
        let Some(block) = self.store.get_mut(block_id) else {
            return Err(EcsError::StaleEntity(entity));
        };

        let signature = block.signature();
        for listener in &mut self.listeners {
            listener.entity_destroyed(entity, &signature);
        }
        release_resources(&mut self.listeners, entity, block, row, &Signature::EMPTY);

        let moved = if enabled {
            block.swap_remove(row)
        } else {
            block.remove_disabled(row)
        };
        if let Some(moved) = moved {
            self.directory.relocate(moved, block_id, row);
        }
        self.directory.release(entity);
        self.store.bump_generation();
        self.store.release_if_empty(block_id);

        tracing::trace!(%entity, "Entity destroyed");
        Ok(())
    }

    /// Whether `entity` is the live handle of its index.
    #[inline]
    #[must_use]
    pub fn is_entity_alive(&self, entity: Entity) -> bool {
        self.directory.is_alive(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.directory.alive_count()
    }

    /// Live entity handles in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.directory.iter_alive().map(|record| record.entity)
    }

    fn location(&self, entity: Entity) -> EcsResult<(BlockId, usize, bool)> {
        let record = self
            .directory
            .get(entity)
            .ok_or(EcsError::StaleEntity(entity))?;
        let block = record.block.ok_or(EcsError::StaleEntity(entity))?;
        Ok((block, record.row as usize, record.enabled))
    }

    fn block_of(&self, entity: Entity) -> EcsResult<(&EntityBlock, usize)> {
        let (block_id, row, _) = self.location(entity)?;
        let block = self
            .store
            .get(block_id)
            .ok_or(EcsError::StaleEntity(entity))?;
        Ok((block, row))
    }

    // ========================================================================
    // ENABLE / DISABLE
    // ========================================================================

    /// Whether the entity sits in the enabled partition.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn is_enabled(&self, entity: Entity) -> EcsResult<bool> {
        self.location(entity).map(|(_, _, enabled)| enabled)
    }

    /// Moves the entity into its block's disabled partition. Queries stop
    /// yielding it. No-op if already disabled.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn disable(&mut self, entity: Entity) -> EcsResult<()> {
        self.set_enabled(entity, false)
    }

    /// Moves the entity back into the enabled partition. No-op if already
    /// enabled.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn enable(&mut self, entity: Entity) -> EcsResult<()> {
        self.set_enabled(entity, true)
    }

    fn set_enabled(&mut self, entity: Entity, enabled: bool) -> EcsResult<()> {
        let (block_id, row, currently) = self.location(entity)?;
        if currently == enabled {
            return Ok(());
        }
        let Some(block) = self.store.get_mut(block_id) else {
            return Err(EcsError::StaleEntity(entity));
        };
        let signature = block.signature();
        let transfer = if enabled {
            block.enable(row)
        } else {
            block.disable(row)
        };

        if let Some((displaced, displaced_row)) = transfer.displaced {
            self.directory.relocate(displaced, block_id, displaced_row);
        }
        self.directory.relocate(entity, block_id, transfer.new_row);
        if let Some(record) = self.directory.get_mut(entity) {
            record.enabled = enabled;
        }
        self.store.bump_generation();

        for listener in &mut self.listeners {
            if enabled {
                listener.entity_enabled(entity, &signature);
            } else {
                listener.entity_disabled(entity, &signature);
            }
        }
        Ok(())
    }

    // ========================================================================
    // COMPONENT ACCESS
    // ========================================================================

    /// Signature of a live entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn signature_of(&self, entity: Entity) -> EcsResult<Signature> {
        self.block_of(entity).map(|(block, _)| block.signature())
    }

    /// Whether a live entity carries component `id`.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn has_component(&self, entity: Entity, id: ComponentTypeId) -> EcsResult<bool> {
        self.signature_of(entity).map(|sig| sig.contains(id))
    }

    /// Whether `entity` is alive and carries `C`.
    #[must_use]
    pub fn has<C: Component>(&self, entity: Entity) -> bool {
        self.has_component(entity, C::ID).unwrap_or(false)
    }

    /// Shared access to a component.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] or [`EcsError::MissingComponent`].
    pub fn get<C: Component>(&self, entity: Entity) -> EcsResult<&C> {
        let (block, row) = self.block_of(entity)?;
        block.component::<C>(row).ok_or(EcsError::MissingComponent {
            entity,
            component: C::ID,
        })
    }

    /// Exclusive access to a component.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] or [`EcsError::MissingComponent`].
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> EcsResult<&mut C> {
        let (block_id, row, _) = self.location(entity)?;
        self.store
            .get_mut(block_id)
            .and_then(|block| block.component_mut::<C>(row))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: C::ID,
            })
    }

    /// Adds `C`, migrating the entity to the block of its new signature.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentAlreadyPresent`], [`EcsError::UnregisteredComponent`],
    /// [`EcsError::StaleEntity`] or block allocation errors.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) -> EcsResult<()> {
        let signature = self.signature_of(entity)?;
        if signature.contains(C::ID) {
            return Err(EcsError::ComponentAlreadyPresent {
                entity,
                component: C::ID,
            });
        }
        if !self.registry.descriptor(C::ID)?.is::<C>() {
            return Err(EcsError::UnregisteredComponent(C::ID));
        }
        self.migrate(entity, signature.with(C::ID))?;
        *self.get_mut::<C>(entity)? = value;
        Ok(())
    }

    /// Removes `C`, migrating the entity, and returns the removed value.
    ///
    /// Listeners see `resource_released` first when `C` owns an external
    /// resource.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingComponent`], [`EcsError::StaleEntity`] or block
    /// allocation errors.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) -> EcsResult<C> {
        let value = *self.get::<C>(entity)?;
        let signature = self.signature_of(entity)?;
        self.migrate(entity, signature.without(C::ID))?;
        Ok(value)
    }

    /// Moves an entity to a block of `target`.
    ///
    /// Components in both signatures are copied, new ones get defaults and
    /// dropped ones are released to listeners. The enabled state is kept.
    fn migrate(&mut self, entity: Entity, target: Signature) -> EcsResult<()> {
        let (old_id, old_row, enabled) = self.location(entity)?;
        let new_id = self.store.acquire(target, &self.registry)?;
        let (new_block, old_block) = self
            .store
            .get2_mut(new_id, old_id)
            .ok_or(EcsError::StaleEntity(entity))?;

        let Some(pushed) = new_block.push(entity) else {
            return Err(EcsError::OutOfBlocks {
                capacity: new_block.capacity(),
            });
        };
        new_block.copy_shared_from(pushed, old_block, old_row);
        release_resources(&mut self.listeners, entity, old_block, old_row, &target);

        let moved = if enabled {
            old_block.swap_remove(old_row)
        } else {
            old_block.remove_disabled(old_row)
        };
        let new_row = if enabled {
            pushed
        } else {
            new_block.disable(pushed).new_row
        };

        if let Some(moved) = moved {
            self.directory.relocate(moved, old_id, old_row);
        }
        self.store.bump_generation();
        self.store.release_if_empty(old_id);
        self.directory.relocate(entity, new_id, new_row);

        tracing::trace!(%entity, from = old_id.index(), to = new_id.index(), "Entity migrated");
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Live blocks whose signature contains `query` and that hold at least
    /// one enabled entity.
    #[must_use]
    pub fn blocks_matching(&self, query: &Signature) -> BlockList {
        self.store.matching_blocks(query)
    }

    /// Read-only view over every enabled entity carrying `Q`'s components.
    #[must_use]
    pub fn query<Q: ReadOnlyQueryData>(&self) -> QueryView<'_, Q> {
        let blocks = self.store.matching_blocks(&Q::signature());
        QueryView::new(&self.store, blocks)
    }

    /// Read-write view over every enabled entity carrying `Q`'s components.
    ///
    /// # Errors
    ///
    /// [`EcsError::AliasedQuery`] if `Q` names a component twice.
    pub fn query_mut<Q: QueryData>(&mut self) -> EcsResult<QueryViewMut<'_, Q>> {
        if let Some(id) = first_duplicate::<Q>() {
            return Err(EcsError::AliasedQuery(id));
        }
        let blocks = self.store.matching_blocks(&Q::signature());
        Ok(QueryViewMut::new(&mut self.store, blocks))
    }

    /// The one enabled entity carrying component `id`.
    ///
    /// More than one candidate is logged and the first is returned.
    ///
    /// # Errors
    ///
    /// [`EcsError::NoSingleton`] if no enabled entity carries `id`.
    pub fn singleton_entity(&self, id: ComponentTypeId) -> EcsResult<Entity> {
        let blocks = self.store.matching_blocks(&Signature::EMPTY.with(id));
        let mut candidates = blocks
            .iter()
            .filter_map(|&block| self.store.get(block))
            .flat_map(|block| block.entities().iter().copied());
        let first = candidates.next().ok_or(EcsError::NoSingleton(id))?;
        let extra = candidates.count();
        if extra > 0 {
            tracing::warn!(component = %id, candidates = extra + 1, "Singleton component is not unique");
        }
        Ok(first)
    }

    // ========================================================================
    // SERIALIZATION HOOKS
    // ========================================================================

    /// Component `id` of `entity` as a TOML value.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`], [`EcsError::MissingComponent`],
    /// [`EcsError::NotSerializable`] or the hook's error.
    pub fn serialize_component(&self, entity: Entity, id: ComponentTypeId) -> EcsResult<toml::Value> {
        let descriptor = self.registry.descriptor(id)?;
        let (block, row) = self.block_of(entity)?;
        let bytes = block.component_bytes(id, row).ok_or(EcsError::MissingComponent {
            entity,
            component: id,
        })?;
        descriptor.serialize(bytes)
    }

    /// Overwrites component `id` of `entity` from a TOML value.
    ///
    /// The component is untouched when the value does not deserialize.
    ///
    /// # Errors
    ///
    /// As [`serialize_component`](Self::serialize_component).
    pub fn deserialize_component(
        &mut self,
        entity: Entity,
        id: ComponentTypeId,
        value: &toml::Value,
    ) -> EcsResult<()> {
        let descriptor = *self.registry.descriptor(id)?;
        let (block_id, row, _) = self.location(entity)?;
        let bytes = self
            .store
            .get_mut(block_id)
            .and_then(|block| block.component_bytes_mut(id, row))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: id,
            })?;
        let mut staged = bytes.to_vec();
        descriptor.deserialize(value, &mut staged)?;
        bytes.copy_from_slice(&staged);
        Ok(())
    }

    /// Every serializable component of `entity`, keyed by component name.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] or a hook's error.
    pub fn inspect_entity(&self, entity: Entity) -> EcsResult<toml::Table> {
        let (block, row) = self.block_of(entity)?;
        let mut table = toml::Table::new();
        for column in block.columns() {
            let descriptor = &column.descriptor;
            if !descriptor.is_serializable() {
                continue;
            }
            if let Some(bytes) = block.component_bytes(descriptor.id, row) {
                table.insert(descriptor.name.to_owned(), descriptor.serialize(bytes)?);
            }
        }
        Ok(table)
    }

    // ========================================================================
    // TRANSFORM HIERARCHY
    // ========================================================================

    /// Inserts `entity` (and missing ancestors) into the hierarchy now.
    ///
    /// # Errors
    ///
    /// See [`TransformHierarchy::insert`].
    pub fn add_to_hierarchy(&mut self, entity: Entity) -> EcsResult<()> {
        self.hierarchy.insert(entity, &self.store, &self.directory)
    }

    /// Inserts `entity` at the next [`end_frame`](Self::end_frame).
    ///
    /// Use this for entities spawned while a propagation pass may be in
    /// progress.
    pub fn queue_hierarchy_insert(&mut self, entity: Entity) {
        self.hierarchy.queue_insert(entity);
    }

    /// Recomputes world matrices. Run once per frame after local transforms
    /// are final.
    pub fn update_hierarchy(&mut self) {
        self.hierarchy.update(&mut self.store, &self.directory);
    }

    /// World matrix from the last hierarchy update.
    #[must_use]
    pub fn world_transform(&self, entity: Entity) -> Option<Mat4> {
        self.hierarchy.world_transform(entity)
    }

    /// World matrix from the update before the last one.
    #[must_use]
    pub fn previous_transform(&self, entity: Entity) -> Option<Mat4> {
        self.hierarchy.previous_transform(entity)
    }

    // ========================================================================
    // FRAME / SCENE LIFECYCLE
    // ========================================================================

    /// Closes the frame: prunes dead hierarchy members and flushes deferred
    /// hierarchy inserts.
    pub fn end_frame(&mut self) {
        self.hierarchy.end_frame(&self.store, &self.directory);
        self.frame += 1;
    }

    /// Destroys every entity, block and hierarchy entry.
    ///
    /// Listeners see `entity_destroyed` and `resource_released` for every
    /// live entity first. Registry and configuration are kept.
    pub fn unload(&mut self) {
        let entities = self.directory.alive_count();
        for (_, block) in self.store.iter() {
            let signature = block.signature();
            for row in (0..block.capacity()).filter(|&row| block.is_occupied(row)) {
                let Some(entity) = block.entity_at(row) else {
                    continue;
                };
                for listener in &mut self.listeners {
                    listener.entity_destroyed(entity, &signature);
                }
                release_resources(&mut self.listeners, entity, block, row, &Signature::EMPTY);
            }
        }
        let blocks = self.store.block_count();
        self.store.clear();
        self.directory.clear();
        self.hierarchy.clear();
        tracing::debug!(scene = %self.name, entities, blocks, "Scene unloaded");
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SceneStats {
        SceneStats {
            alive_entities: self.directory.alive_count(),
            directory_records: self.directory.len(),
            blocks: self.store.block_count(),
            slab_buffers: self.store.slab_buffers_in_use(),
            generation: self.store.generation(),
            cached_queries: self.store.cached_queries(),
            hierarchy_members: self.hierarchy.len(),
            hierarchy_depth: self.hierarchy.depth(),
            frame: self.frame,
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Tells listeners about owned resources of `block[row]` not kept in `kept`.
fn release_resources(
    listeners: &mut [Box<dyn SceneListener>],
    entity: Entity,
    block: &EntityBlock,
    row: usize,
    kept: &Signature,
) {
    if listeners.is_empty() {
        return;
    }
    for column in block.columns() {
        let id = column.id();
        if !column.descriptor.owns_external_resource || kept.contains(id) {
            continue;
        }
        if let Some(bytes) = block.component_bytes(id, row) {
            for listener in listeners.iter_mut() {
                listener.resource_released(entity, id, bytes);
            }
        }
    }
}
