//! # Archetype Block Store
//!
//! Owns every live [`EntityBlock`]: headers live in a [`PoolAllocator`],
//! payloads come from a [`SlabAllocator`]. Blocks are created lazily the
//! first time a signature has no block with a free row and destroyed as
//! soon as their last entity leaves.
//!
//! ## Query cache
//!
//! Matching block lists are cached per query signature together with the
//! store generation they were computed at. Every structural mutation bumps
//! the generation, so a stale list is never served.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::block::{BlockLayout, EntityBlock};
use super::entity::Entity;
use super::registry::ComponentRegistry;
use super::signature::Signature;
use crate::config::{BlockMatchPolicy, SceneConfig};
use crate::error::{EcsError, EcsResult};
use crate::memory::{PoolAllocator, PoolHandle, SlabAllocator};

/// Identifies a live block; a slot in the header pool.
pub type BlockId = PoolHandle;

/// Block list shared between the cache and live queries.
pub type BlockList = Arc<[BlockId]>;

#[derive(Clone)]
struct CachedQuery {
    generation: u64,
    blocks: BlockList,
}

/// Block lifecycle, archetype matching and the query cache.
pub struct BlockStore {
    capacity: usize,
    block_bytes: usize,
    policy: BlockMatchPolicy,
    cache_queries: bool,
    pool: PoolAllocator<EntityBlock>,
    slab: SlabAllocator,
    /// Blocks per exact signature, ascending by id.
    by_signature: HashMap<Signature, Vec<BlockId>>,
    layouts: HashMap<Signature, BlockLayout>,
    generation: u64,
    query_cache: Mutex<HashMap<Signature, CachedQuery>>,
}

impl BlockStore {
    /// Creates an empty store sized from `config`.
    ///
    /// `config` is expected to be validated.
    #[must_use]
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            capacity: config.block_capacity,
            block_bytes: config.block_bytes,
            policy: config.block_match,
            cache_queries: config.cache_queries,
            pool: PoolAllocator::new(config.max_blocks),
            slab: SlabAllocator::new(config.block_bytes, config.max_blocks),
            by_signature: HashMap::new(),
            layouts: HashMap::new(),
            generation: 0,
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Structural generation; changes on every structural mutation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks a structural mutation.
    #[inline]
    pub(crate) fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Rows per block.
    #[inline]
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live blocks.
    #[inline]
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.pool.allocated_count()
    }

    /// Slab buffers currently owned by blocks.
    #[inline]
    #[must_use]
    pub fn slab_buffers_in_use(&self) -> usize {
        self.slab.outstanding()
    }

    /// Block behind `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&EntityBlock> {
        self.pool.get(id)
    }

    /// Mutable block behind `id`.
    #[inline]
    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut EntityBlock> {
        self.pool.get_mut(id)
    }

    /// Two distinct blocks at once.
    #[inline]
    pub fn get2_mut(
        &mut self,
        a: BlockId,
        b: BlockId,
    ) -> Option<(&mut EntityBlock, &mut EntityBlock)> {
        self.pool.get2_mut(a, b)
    }

    /// All live blocks in id order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &EntityBlock)> {
        self.pool.iter()
    }

    /// Blocks whose signature equals `signature`, ascending by id.
    #[must_use]
    pub fn blocks_with_signature(&self, signature: &Signature) -> &[BlockId] {
        self.by_signature.get(signature).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Option<EntityBlock>] {
        self.pool.slots_mut()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Returns a block of exactly `signature` with a free row, creating one
    /// when none has space.
    ///
    /// # Errors
    ///
    /// See [`create_block`](Self::create_block).
    pub fn acquire(&mut self, signature: Signature, registry: &ComponentRegistry) -> EcsResult<BlockId> {
        match self.find_with_space(&signature) {
            Some(id) => Ok(id),
            None => self.create_block(signature, registry),
        }
    }

    /// Appends `entity` to a block of `signature`, returning its location.
    ///
    /// # Errors
    ///
    /// See [`create_block`](Self::create_block).
    pub fn insert(
        &mut self,
        signature: Signature,
        registry: &ComponentRegistry,
        entity: Entity,
    ) -> EcsResult<(BlockId, usize)> {
        let id = self.acquire(signature, registry)?;
        let capacity = self.pool.capacity();
        let row = self
            .pool
            .get_mut(id)
            .and_then(|block| block.push(entity))
            .ok_or(EcsError::OutOfBlocks { capacity })?;
        self.bump_generation();
        Ok((id, row))
    }

    fn find_with_space(&self, signature: &Signature) -> Option<BlockId> {
        let candidates = self
            .blocks_with_signature(signature)
            .iter()
            .filter_map(|&id| self.pool.get(id).map(|block| (id, block)))
            .filter(|(_, block)| block.has_space());
        match self.policy {
            BlockMatchPolicy::FirstFit => candidates.map(|(id, _)| id).next(),
            BlockMatchPolicy::MostOccupied => candidates
                // Ties go to the lowest id: max_by_key keeps the last maximum.
                .rev()
                .max_by_key(|(_, block)| block.occupied())
                .map(|(id, _)| id),
        }
    }

    /// Allocates a header and a payload for a new block of `signature`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredComponent`] / [`EcsError::LayoutTooLarge`]
    ///   from layout generation
    /// - [`EcsError::OutOfSlabs`] / [`EcsError::OutOfBlocks`] on exhaustion
    pub fn create_block(
        &mut self,
        signature: Signature,
        registry: &ComponentRegistry,
    ) -> EcsResult<BlockId> {
        if !self.layouts.contains_key(&signature) {
            let layout = BlockLayout::generate(signature, registry, self.capacity, self.block_bytes)?;
            self.layouts.insert(signature, layout);
        }
        let layout = &self.layouts[&signature];

        let payload = self.slab.allocate().ok_or(EcsError::OutOfSlabs {
            capacity: self.slab.capacity(),
        })?;
        let id = match self.pool.allocate(EntityBlock::new(layout, payload)) {
            Ok(id) => id,
            Err(block) => {
                self.slab.free(block.into_payload());
                return Err(EcsError::OutOfBlocks {
                    capacity: self.pool.capacity(),
                });
            }
        };

        let ids = self.by_signature.entry(signature).or_default();
        let pos = ids.partition_point(|&existing| existing < id);
        ids.insert(pos, id);
        self.bump_generation();

        tracing::debug!(
            block = id.index(),
            signature = ?signature,
            live_blocks = self.pool.allocated_count(),
            "Block created"
        );
        Ok(id)
    }

    /// Frees the block and returns its payload to the slab.
    pub fn destroy_block(&mut self, id: BlockId) {
        let Some(block) = self.pool.free(id) else {
            return;
        };
        let signature = block.signature();
        if let Some(ids) = self.by_signature.get_mut(&signature) {
            ids.retain(|&existing| existing != id);
            if ids.is_empty() {
                self.by_signature.remove(&signature);
            }
        }
        self.slab.free(block.into_payload());
        self.bump_generation();

        tracing::debug!(
            block = id.index(),
            signature = ?signature,
            live_blocks = self.pool.allocated_count(),
            "Block destroyed"
        );
    }

    /// Destroys the block if it holds no entity. Returns whether it did.
    pub fn release_if_empty(&mut self, id: BlockId) -> bool {
        let empty = self.pool.get(id).is_some_and(EntityBlock::is_empty);
        if empty {
            self.destroy_block(id);
        }
        empty
    }

    /// Destroys every block. Layouts stay cached.
    pub fn clear(&mut self) {
        for block in self.pool.drain() {
            self.slab.free(block.into_payload());
        }
        self.by_signature.clear();
        self.query_cache.lock().clear();
        self.bump_generation();
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Live blocks whose signature contains `query` and that hold at least
    /// one enabled entity, ascending by id.
    pub fn matching_blocks(&self, query: &Signature) -> BlockList {
        if !self.cache_queries {
            return self.scan(query);
        }
        let mut cache = self.query_cache.lock();
        if let Some(cached) = cache.get(query) {
            if cached.generation == self.generation {
                return Arc::clone(&cached.blocks);
            }
        }
        let blocks = self.scan(query);
        cache.insert(
            *query,
            CachedQuery {
                generation: self.generation,
                blocks: Arc::clone(&blocks),
            },
        );
        blocks
    }

    fn scan(&self, query: &Signature) -> BlockList {
        self.pool
            .iter()
            .filter(|(_, block)| block.signature().is_superset_of(query) && block.entity_count() > 0)
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of cached query signatures.
    #[must_use]
    pub fn cached_queries(&self) -> usize {
        self.query_cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Component, Light, Transform};

    fn store(policy: BlockMatchPolicy) -> (BlockStore, ComponentRegistry) {
        let config = SceneConfig {
            block_capacity: 4,
            block_bytes: 4096,
            max_blocks: 3,
            block_match: policy,
            ..SceneConfig::default()
        };
        (BlockStore::new(&config), ComponentRegistry::with_builtins())
    }

    fn fill(store: &mut BlockStore, id: BlockId, count: u32) {
        let block = store.get_mut(id).unwrap();
        for i in 0..count {
            block.push(Entity::new(i, 1)).unwrap();
        }
        store.bump_generation();
    }

    #[test]
    fn test_acquire_reuses_block_with_space() {
        let (mut store, registry) = store(BlockMatchPolicy::FirstFit);
        let sig = Signature::from_ids(&[Transform::ID]);
        let a = store.acquire(sig, &registry).unwrap();
        fill(&mut store, a, 3);
        assert_eq!(store.acquire(sig, &registry).unwrap(), a);

        fill(&mut store, a, 1);
        let b = store.acquire(sig, &registry).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.blocks_with_signature(&sig), &[a, b]);
    }

    #[test]
    fn test_most_occupied_policy() {
        let (mut store, registry) = store(BlockMatchPolicy::MostOccupied);
        let sig = Signature::from_ids(&[Transform::ID]);
        let a = store.create_block(sig, &registry).unwrap();
        let b = store.create_block(sig, &registry).unwrap();
        fill(&mut store, a, 1);
        fill(&mut store, b, 2);
        assert_eq!(store.acquire(sig, &registry).unwrap(), b);
    }

    #[test]
    fn test_exhaustion_and_release() {
        let (mut store, registry) = store(BlockMatchPolicy::FirstFit);
        let sig = Signature::from_ids(&[Light::ID]);
        let ids: Vec<_> = (0..3).map(|_| store.create_block(sig, &registry).unwrap()).collect();
        assert!(matches!(
            store.create_block(sig, &registry),
            Err(EcsError::OutOfSlabs { capacity: 3 })
        ));

        assert!(store.release_if_empty(ids[1]));
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.slab_buffers_in_use(), 2);
        assert!(store.create_block(sig, &registry).is_ok());
    }

    #[test]
    fn test_query_cache_follows_generation() {
        let (mut store, registry) = store(BlockMatchPolicy::FirstFit);
        let query = Signature::from_ids(&[Transform::ID]);
        let a = store.create_block(query, &registry).unwrap();
        assert!(store.matching_blocks(&query).is_empty());

        fill(&mut store, a, 1);
        assert_eq!(&*store.matching_blocks(&query), &[a]);

        let wider = query.with(Light::ID);
        let b = store.create_block(wider, &registry).unwrap();
        fill(&mut store, b, 1);
        assert_eq!(&*store.matching_blocks(&query), &[a, b]);
        assert_eq!(&*store.matching_blocks(&wider), &[b]);
        assert_eq!(store.cached_queries(), 2);
    }
}
