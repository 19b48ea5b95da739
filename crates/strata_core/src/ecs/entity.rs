//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the scene directory
//! - A generation counter for safe reuse

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::archetype::BlockId;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the scene directory
/// - Upper 32 bits: Generation counter for detecting stale references
///
/// Live generations start at 1, so the all-zero bit pattern written into
/// free block rows never names a live entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable, Serialize, Deserialize)]
#[serde(from = "EntityParts", into = "EntityParts")]
#[repr(transparent)]
pub struct Entity(u64);

impl Entity {
    /// Creates a new entity handle from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Packed 64-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from [`to_bits`](Self::to_bits).
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Null/invalid entity handle.
    pub const INVALID: Self = Self(u64::MAX);

    /// Checks if this handle is the `INVALID` sentinel.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            f.write_str("Entity(INVALID)")
        } else {
            write!(f, "Entity({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Serialized form: TOML integers are signed 64-bit, so the packed value is
/// split instead of written whole.
#[derive(Clone, Copy, Serialize, Deserialize)]
struct EntityParts {
    index: u32,
    generation: u32,
}

impl From<EntityParts> for Entity {
    fn from(parts: EntityParts) -> Self {
        Self::new(parts.index, parts.generation)
    }
}

impl From<Entity> for EntityParts {
    fn from(entity: Entity) -> Self {
        Self {
            index: entity.index(),
            generation: entity.generation(),
        }
    }
}

/// Directory record for one entity index.
///
/// The `block`/`row` pair is the only place that knows where the entity's
/// components physically live; every swap and migration rewrites it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityData {
    /// Handle currently (or last) issued for this index.
    pub entity: Entity,
    /// Owning block, `None` once destroyed.
    pub block: Option<BlockId>,
    /// Row within the owning block.
    pub row: u32,
    /// Current generation of the index slot.
    pub generation: u32,
    /// Whether the entity sits in the enabled partition of its block.
    pub enabled: bool,
}

impl EntityData {
    /// Record for a freshly created entity.
    #[must_use]
    pub const fn new(entity: Entity, block: BlockId, row: u32) -> Self {
        Self {
            entity,
            block: Some(block),
            row,
            generation: entity.generation(),
            enabled: true,
        }
    }

    /// Whether the record describes a live entity.
    #[inline]
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.block.is_some()
    }

    /// Whether `entity` is the live handle for this record.
    #[inline]
    #[must_use]
    pub fn matches(&self, entity: Entity) -> bool {
        self.is_alive() && self.generation == entity.generation()
    }
}

/// Next generation after `generation`, skipping 0.
#[inline]
#[must_use]
pub(crate) const fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// Dense table of [`EntityData`] indexed by entity index.
///
/// Records are never physically removed. With recycling on, freed indices
/// are reused most recent first; the generation is bumped at destruction so a
/// stale handle never matches the reused slot.
#[derive(Debug, Default)]
pub struct EntityDirectory {
    records: Vec<EntityData>,
    free_indices: Vec<u32>,
    recycle: bool,
    alive: usize,
}

impl EntityDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new(recycle: bool) -> Self {
        Self {
            records: Vec::new(),
            free_indices: Vec::new(),
            recycle,
            alive: 0,
        }
    }

    /// Number of records, live or dead.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no entity was ever created.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Issues a handle. The record stays unplaced until [`place`](Self::place).
    pub(crate) fn reserve(&mut self) -> Entity {
        if self.recycle {
            if let Some(index) = self.free_indices.pop() {
                let record = &mut self.records[index as usize];
                record.entity = Entity::new(index, record.generation);
                return record.entity;
            }
        }
        debug_assert!(self.records.len() < u32::MAX as usize, "Entity index space exhausted");
        #[allow(clippy::cast_possible_truncation)]
        let entity = Entity::new(self.records.len() as u32, 1);
        self.records.push(EntityData {
            entity,
            block: None,
            row: 0,
            generation: 1,
            enabled: true,
        });
        entity
    }

    /// Returns a reserved, never placed handle to the free list.
    pub(crate) fn abandon(&mut self, entity: Entity) {
        debug_assert!(!self.is_alive(entity), "Abandoning a placed handle");
        if self.recycle {
            self.free_indices.push(entity.index());
        }
    }

    /// Marks a reserved handle live at `(block, row)`.
    pub(crate) fn place(&mut self, entity: Entity, block: BlockId, row: usize) {
        let record = &mut self.records[entity.index() as usize];
        debug_assert_eq!(record.entity, entity, "Placing a handle that was not reserved");
        *record = EntityData::new(entity, block, row_u32(row));
        self.alive += 1;
    }

    /// Live record for `entity`.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&EntityData> {
        self.records
            .get(entity.index() as usize)
            .filter(|record| record.matches(entity))
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, entity: Entity) -> Option<&mut EntityData> {
        self.records
            .get_mut(entity.index() as usize)
            .filter(|record| record.matches(entity))
    }

    /// Whether `entity` is the live handle of its index.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Current `(block, row)` of a live entity.
    #[inline]
    #[must_use]
    pub fn locate(&self, entity: Entity) -> Option<(BlockId, usize)> {
        let record = self.get(entity)?;
        record.block.map(|block| (block, record.row as usize))
    }

    /// Rewrites the location of a live entity.
    pub(crate) fn relocate(&mut self, entity: Entity, block: BlockId, row: usize) {
        let record = self.get_mut(entity);
        debug_assert!(record.is_some(), "Relocating dead entity {entity}");
        if let Some(record) = record {
            record.block = Some(block);
            record.row = row_u32(row);
        }
    }

    /// Kills `entity`, bumping its slot generation.
    pub(crate) fn release(&mut self, entity: Entity) {
        let Some(record) = self.get_mut(entity) else {
            return;
        };
        record.block = None;
        record.generation = next_generation(record.generation);
        self.alive -= 1;
        if self.recycle {
            self.free_indices.push(entity.index());
        }
    }

    /// Live records in index order.
    pub fn iter_alive(&self) -> impl Iterator<Item = &EntityData> {
        self.records.iter().filter(|record| record.is_alive())
    }

    /// Kills every live record.
    ///
    /// Records are kept so that handles issued before the clear never match
    /// a reused index.
    pub(crate) fn clear(&mut self) {
        for record in self.records.iter_mut().filter(|record| record.is_alive()) {
            record.block = None;
            record.generation = next_generation(record.generation);
        }
        self.alive = 0;
        self.free_indices.clear();
        if self.recycle {
            // Lowest index on top.
            #[allow(clippy::cast_possible_truncation)]
            self.free_indices
                .extend((0..self.records.len() as u32).rev());
        }
    }
}

#[inline]
fn row_u32(row: usize) -> u32 {
    u32::try_from(row).unwrap_or(u32::MAX)
}
