//! # Transform Hierarchy
//!
//! Depth-leveled parent/child propagation.
//!
//! ```text
//! level 0: [root_a, root_b]                  world = local
//! level 1: [a.0, a.1, b.0]   parent_idx 0,0,1   world = level0[parent_idx] * local
//! level 2: [a.1.0]           parent_idx 1
//! ```
//!
//! Entries of level `d > 0` are sorted by `parent_idx`, so walking the
//! levels top-down visits every parent before its children. Entries refer
//! to entities by handle only; block and row are resolved through the
//! directory at use time, so migrations never leave a dangling reference.

use std::collections::{HashMap, HashSet};

use strata_shared::Mat4;

use super::archetype::BlockStore;
use super::component::{Child, Component, Transform, WorldTransform};
use super::entity::{Entity, EntityDirectory};
use crate::error::{EcsError, EcsResult};

/// One hierarchy member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HierarchyEntry {
    /// Index of the parent in the previous level; 0 on level 0.
    pub parent_idx: u32,
    /// The member.
    pub entity: Entity,
}

#[derive(Clone, Debug, Default)]
struct Level {
    entries: Vec<HierarchyEntry>,
    /// World matrix per entry; `None` until the first update.
    worlds: Vec<Option<Mat4>>,
}

/// World-transform propagation over parent chains.
#[derive(Debug, Default)]
pub struct TransformHierarchy {
    levels: Vec<Level>,
    /// `(depth, position)` of every member.
    slots: HashMap<Entity, (usize, usize)>,
    /// Previous-frame world matrix by entity index.
    previous: Vec<Option<(Entity, Mat4)>>,
    pending: Vec<Entity>,
}

impl TransformHierarchy {
    /// Empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of non-empty levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.iter().take_while(|level| !level.entries.is_empty()).count()
    }

    /// Entries of level `depth`.
    #[must_use]
    pub fn level(&self, depth: usize) -> &[HierarchyEntry] {
        self.levels.get(depth).map_or(&[], |level| &level.entries)
    }

    /// Level of a member.
    #[must_use]
    pub fn depth_of(&self, entity: Entity) -> Option<usize> {
        self.slots.get(&entity).map(|&(depth, _)| depth)
    }

    /// Whether `entity` is a member.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slots.contains_key(&entity)
    }

    /// Deferred inserts waiting for [`end_frame`](Self::end_frame).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// World matrix from the last update.
    #[must_use]
    pub fn world_transform(&self, entity: Entity) -> Option<Mat4> {
        let &(depth, pos) = self.slots.get(&entity)?;
        self.levels.get(depth)?.worlds.get(pos).copied().flatten()
    }

    /// World matrix from the update before the last one.
    #[must_use]
    pub fn previous_transform(&self, entity: Entity) -> Option<Mat4> {
        match self.previous.get(entity.index() as usize) {
            Some(Some((owner, world))) if *owner == entity => Some(*world),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------------

    /// Inserts `entity` and any ancestors not yet present.
    ///
    /// The parent chain is followed through `Child` components. Inserting a
    /// member again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`EcsError::StaleEntity`] if `entity` is dead
    /// - [`EcsError::HierarchyParentNotAlive`] if a link points at a dead entity
    /// - [`EcsError::HierarchyCycle`] if the chain loops
    /// - [`EcsError::HierarchyMissingTransform`] if a chain member has no `Transform`
    ///
    /// Nothing is inserted on error.
    pub fn insert(
        &mut self,
        entity: Entity,
        store: &BlockStore,
        directory: &EntityDirectory,
    ) -> EcsResult<()> {
        if !directory.is_alive(entity) {
            return Err(EcsError::StaleEntity(entity));
        }
        if self.contains(entity) {
            return Ok(());
        }

        // Walk up until a root or an existing member.
        let mut path = vec![entity];
        let mut visited = HashSet::from([entity]);
        let mut current = entity;
        while let Some(parent) = parent_of(current, store, directory) {
            if !directory.is_alive(parent) {
                return Err(EcsError::HierarchyParentNotAlive {
                    child: current,
                    parent,
                });
            }
            if !visited.insert(parent) {
                return Err(EcsError::HierarchyCycle(parent));
            }
            if self.contains(parent) {
                break;
            }
            path.push(parent);
            current = parent;
        }
        if let Some(&missing) = path.iter().find(|&&e| !has_transform(e, store, directory)) {
            return Err(EcsError::HierarchyMissingTransform(missing));
        }

        for &member in path.iter().rev() {
            let parent = parent_of(member, store, directory);
            self.insert_one(member, parent);
        }
        Ok(())
    }

    fn insert_one(&mut self, entity: Entity, parent: Option<Entity>) {
        let parent_slot = parent.and_then(|p| self.slots.get(&p).copied());
        let Some((parent_depth, parent_pos)) = parent_slot else {
            let roots = self.level_mut(0);
            roots.entries.push(HierarchyEntry {
                parent_idx: 0,
                entity,
            });
            roots.worlds.push(None);
            let pos = roots.entries.len() - 1;
            self.slots.insert(entity, (0, pos));
            return;
        };

        let depth = parent_depth + 1;
        let parent_idx = index_u32(parent_pos);
        let level = self.level_mut(depth);
        let pos = level.entries.partition_point(|entry| entry.parent_idx <= parent_idx);
        level.entries.insert(pos, HierarchyEntry { parent_idx, entity });
        level.worlds.insert(pos, None);
        for (shifted, entry) in self.levels[depth].entries.iter().enumerate().skip(pos) {
            self.slots.insert(entry.entity, (depth, shifted));
        }

        // Everything at or after `pos` shifted by one.
        if let Some(children) = self.levels.get_mut(depth + 1) {
            for entry in &mut children.entries {
                if entry.parent_idx as usize >= pos {
                    entry.parent_idx += 1;
                }
            }
        }
    }

    fn level_mut(&mut self, depth: usize) -> &mut Level {
        if self.levels.len() <= depth {
            self.levels.resize_with(depth + 1, Level::default);
        }
        &mut self.levels[depth]
    }

    /// Buffers `entity` for insertion at the next [`end_frame`](Self::end_frame).
    pub fn queue_insert(&mut self, entity: Entity) {
        self.pending.push(entity);
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Recomputes every world matrix top-down.
    ///
    /// The previous matrix is archived first. Members carrying a
    /// `WorldTransform` component get it written. Members that died since
    /// the last prune inherit their parent's matrix.
    pub fn update(&mut self, store: &mut BlockStore, directory: &EntityDirectory) {
        for depth in 0..self.levels.len() {
            let (done, rest) = self.levels.split_at_mut(depth);
            let parents = done.last();
            let level = &mut rest[0];
            for (entry, world) in level.entries.iter().zip(level.worlds.iter_mut()) {
                let parent_world = parents
                    .and_then(|p| p.worlds.get(entry.parent_idx as usize).copied().flatten())
                    .unwrap_or(Mat4::IDENTITY);

                let Some((block_id, row)) = directory.locate(entry.entity) else {
                    *world = Some(parent_world);
                    continue;
                };
                let Some(block) = store.get_mut(block_id) else {
                    continue;
                };
                let local = block
                    .component::<Transform>(row)
                    .map_or(Mat4::IDENTITY, Transform::to_matrix);
                let next = if parents.is_some() {
                    parent_world * local
                } else {
                    local
                };

                if let Some(old) = world.replace(next) {
                    let slot = entry.entity.index() as usize;
                    if self.previous.len() <= slot {
                        self.previous.resize(slot + 1, None);
                    }
                    self.previous[slot] = Some((entry.entity, old));
                }
                if let Some(out) = block.component_mut::<WorldTransform>(row) {
                    out.0 = next;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Frame boundary
    // ------------------------------------------------------------------------

    /// Prunes dead members with their subtrees, then flushes deferred inserts.
    pub fn end_frame(&mut self, store: &BlockStore, directory: &EntityDirectory) {
        self.prune(directory);
        for entity in std::mem::take(&mut self.pending) {
            if let Err(error) = self.insert(entity, store, directory) {
                tracing::warn!(%entity, %error, "Deferred hierarchy insert rejected");
            }
        }
    }

    fn prune(&mut self, directory: &EntityDirectory) {
        let mut removed = 0usize;
        // New index per old index of the previous level; `None` if removed.
        let mut remap: Vec<Option<u32>> = Vec::new();
        for (depth, level) in self.levels.iter_mut().enumerate() {
            let mut next_remap = Vec::with_capacity(level.entries.len());
            let mut kept = 0u32;
            let mut write = 0usize;
            for read in 0..level.entries.len() {
                let mut entry = level.entries[read];
                let parent = if depth == 0 {
                    Some(0)
                } else {
                    remap.get(entry.parent_idx as usize).copied().flatten()
                };
                match parent {
                    Some(parent_idx) if directory.is_alive(entry.entity) => {
                        entry.parent_idx = parent_idx;
                        self.slots.insert(entry.entity, (depth, write));
                        level.entries[write] = entry;
                        level.worlds[write] = level.worlds[read];
                        write += 1;
                        next_remap.push(Some(kept));
                        kept += 1;
                    }
                    _ => {
                        self.slots.remove(&entry.entity);
                        if let Some(slot) = self.previous.get_mut(entry.entity.index() as usize) {
                            if matches!(slot, Some((owner, _)) if *owner == entry.entity) {
                                *slot = None;
                            }
                        }
                        next_remap.push(None);
                        removed += 1;
                    }
                }
            }
            level.entries.truncate(write);
            level.worlds.truncate(write);
            remap = next_remap;
        }
        while self.levels.last().is_some_and(|level| level.entries.is_empty()) {
            self.levels.pop();
        }
        if removed > 0 {
            tracing::warn!(removed, "Pruned dead entities from the transform hierarchy");
        }
    }

    /// Drops every member and pending insert.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.slots.clear();
        self.previous.clear();
        self.pending.clear();
    }
}

fn parent_of(entity: Entity, store: &BlockStore, directory: &EntityDirectory) -> Option<Entity> {
    let (block, row) = directory.locate(entity)?;
    let child = store.get(block)?.component::<Child>(row)?;
    (!child.parent.is_invalid()).then_some(child.parent)
}

fn has_transform(entity: Entity, store: &BlockStore, directory: &EntityDirectory) -> bool {
    directory
        .locate(entity)
        .and_then(|(block, _)| store.get(block))
        .is_some_and(|block| block.signature().contains(Transform::ID))
}

#[inline]
fn index_u32(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}
