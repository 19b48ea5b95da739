//! # Archetype Blocks
//!
//! A block stores up to `capacity` entities sharing one signature in
//! structure-of-arrays form inside a single slab buffer:
//!
//! ```text
//! [Entity; capacity] [C0; capacity] [C3; capacity] [C9; capacity] ...
//!  row -> entity      one column per component, ascending ID order
//! ```
//!
//! Rows are partitioned in three contiguous ranges:
//!
//! ```text
//! 0            entity_count        disabled_start          capacity
//! |  enabled   |       free (zeroed)     |      disabled       |
//! ```
//!
//! Every row move is a byte copy; `Component: Pod` makes that sound.

use std::mem::size_of;

use super::component::{Component, ComponentTypeId};
use super::entity::Entity;
use super::registry::{ComponentDescriptor, ComponentRegistry};
use super::signature::Signature;
use crate::error::{EcsError, EcsResult};
use crate::memory::SlabBuffer;

const ENTITY_SIZE: usize = size_of::<Entity>();

// ============================================================================
// LAYOUT
// ============================================================================

/// One component column inside a block payload.
#[derive(Clone, Copy, Debug)]
pub struct Column {
    /// Byte offset of row 0.
    pub offset: usize,
    /// Registry descriptor of the stored type.
    pub descriptor: ComponentDescriptor,
}

impl Column {
    /// Component ID stored in this column.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentTypeId {
        self.descriptor.id
    }

    #[inline]
    fn span(&self, row: usize) -> std::ops::Range<usize> {
        let start = self.offset + row * self.descriptor.size;
        start..start + self.descriptor.size
    }
}

/// Byte layout shared by every block of one signature.
#[derive(Clone, Debug)]
pub struct BlockLayout {
    signature: Signature,
    capacity: usize,
    columns: Vec<Column>,
    total_bytes: usize,
}

impl BlockLayout {
    /// Computes column offsets for `signature`.
    ///
    /// The entity array comes first; each column follows in ascending ID
    /// order, aligned to its component's alignment.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredComponent`] if the signature names an
    ///   unknown ID
    /// - [`EcsError::LayoutTooLarge`] if the columns overflow `block_bytes`
    pub fn generate(
        signature: Signature,
        registry: &ComponentRegistry,
        capacity: usize,
        block_bytes: usize,
    ) -> EcsResult<Self> {
        let mut offset = ENTITY_SIZE * capacity;
        let mut columns = Vec::with_capacity(signature.len());
        for id in signature.iter() {
            let descriptor = *registry.descriptor(id)?;
            offset = offset.next_multiple_of(descriptor.align);
            columns.push(Column { offset, descriptor });
            offset += descriptor.size * capacity;
        }
        if offset > block_bytes {
            return Err(EcsError::LayoutTooLarge {
                required: offset,
                available: block_bytes,
            });
        }
        Ok(Self {
            signature,
            capacity,
            columns,
            total_bytes: offset,
        })
    }

    /// Signature the layout was generated for.
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Rows per block.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Columns in ascending ID order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Payload bytes actually used.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

// ============================================================================
// BLOCK
// ============================================================================

/// Result of moving an entity across the enabled/disabled boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowTransfer {
    /// Row the target entity ended up in.
    pub new_row: usize,
    /// Another entity displaced by the swap, with its new row.
    pub displaced: Option<(Entity, usize)>,
}

/// Fixed-capacity archetype chunk.
pub struct EntityBlock {
    signature: Signature,
    capacity: usize,
    entity_count: usize,
    disabled_start: usize,
    columns: Vec<Column>,
    payload: SlabBuffer,
}

impl EntityBlock {
    /// Builds an empty block over a zeroed payload buffer.
    #[must_use]
    pub fn new(layout: &BlockLayout, payload: SlabBuffer) -> Self {
        debug_assert!(payload.len() >= layout.total_bytes, "Payload smaller than layout");
        Self {
            signature: layout.signature,
            capacity: layout.capacity,
            entity_count: 0,
            disabled_start: layout.capacity,
            columns: layout.columns.clone(),
            payload,
        }
    }

    /// Gives the payload back for return to the slab.
    #[must_use]
    pub fn into_payload(self) -> SlabBuffer {
        self.payload
    }

    /// Archetype signature.
    #[inline]
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Maximum rows.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of enabled entities; they occupy rows `[0, entity_count)`.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// First disabled row; disabled entities occupy `[disabled_start, capacity)`.
    #[inline]
    #[must_use]
    pub fn disabled_start(&self) -> usize {
        self.disabled_start
    }

    /// Last row still available to enabled entities, `None` when every
    /// row is disabled.
    #[inline]
    #[must_use]
    pub fn last_enabled_index(&self) -> Option<usize> {
        self.disabled_start.checked_sub(1)
    }

    /// Number of disabled entities.
    #[inline]
    #[must_use]
    pub fn disabled_count(&self) -> usize {
        self.capacity - self.disabled_start
    }

    /// Enabled plus disabled entities.
    #[inline]
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.entity_count + self.disabled_count()
    }

    /// Whether a free row remains.
    #[inline]
    #[must_use]
    pub fn has_space(&self) -> bool {
        self.entity_count < self.disabled_start
    }

    /// Whether the block holds no entity at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Whether `row` holds an entity (enabled or disabled).
    #[inline]
    #[must_use]
    pub fn is_occupied(&self, row: usize) -> bool {
        row < self.entity_count || (self.disabled_start..self.capacity).contains(&row)
    }

    /// Columns in ascending ID order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column for `id`, if present.
    #[inline]
    #[must_use]
    pub fn column(&self, id: ComponentTypeId) -> Option<&Column> {
        self.columns
            .binary_search_by_key(&id, Column::id)
            .ok()
            .map(|idx| &self.columns[idx])
    }

    // ------------------------------------------------------------------------
    // Entity array
    // ------------------------------------------------------------------------

    /// The entity array over all rows, free rows included.
    #[inline]
    #[must_use]
    pub fn entity_slots(&self) -> &[Entity] {
        bytemuck::cast_slice(&self.payload.as_bytes()[..ENTITY_SIZE * self.capacity])
    }

    /// Enabled entities in row order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entity_slots()[..self.entity_count]
    }

    /// Disabled entities in row order.
    #[inline]
    #[must_use]
    pub fn disabled_entities(&self) -> &[Entity] {
        &self.entity_slots()[self.disabled_start..]
    }

    /// Entity stored at `row`, if occupied.
    #[inline]
    #[must_use]
    pub fn entity_at(&self, row: usize) -> Option<Entity> {
        self.is_occupied(row).then(|| self.entity_slots()[row])
    }

    fn set_entity(&mut self, row: usize, entity: Entity) {
        let start = row * ENTITY_SIZE;
        self.payload.as_bytes_mut()[start..start + ENTITY_SIZE]
            .copy_from_slice(bytemuck::bytes_of(&entity));
    }

    // ------------------------------------------------------------------------
    // Typed and untyped component access
    // ------------------------------------------------------------------------

    /// Column of `C` over the enabled rows.
    ///
    /// `None` if the block has no such column or a different type is
    /// registered under `C::ID`.
    #[must_use]
    pub fn components<C: Component>(&self) -> Option<&[C]> {
        let column = self.column(C::ID).filter(|c| c.descriptor.is::<C>())?;
        let len = column.descriptor.size * self.entity_count;
        Some(bytemuck::cast_slice(
            &self.payload.as_bytes()[column.offset..column.offset + len],
        ))
    }

    /// Mutable column of `C` over the enabled rows.
    pub fn components_mut<C: Component>(&mut self) -> Option<&mut [C]> {
        let column = *self.column(C::ID).filter(|c| c.descriptor.is::<C>())?;
        let len = column.descriptor.size * self.entity_count;
        Some(bytemuck::cast_slice_mut(
            &mut self.payload.as_bytes_mut()[column.offset..column.offset + len],
        ))
    }

    /// `C` at an occupied row.
    #[must_use]
    pub fn component<C: Component>(&self, row: usize) -> Option<&C> {
        let bytes = self.component_bytes(C::ID, row)?;
        self.column(C::ID)?.descriptor.is::<C>().then(|| bytemuck::from_bytes(bytes))
    }

    /// Mutable `C` at an occupied row.
    pub fn component_mut<C: Component>(&mut self, row: usize) -> Option<&mut C> {
        if !self.column(C::ID)?.descriptor.is::<C>() {
            return None;
        }
        self.component_bytes_mut(C::ID, row).map(bytemuck::from_bytes_mut)
    }

    /// Raw bytes of component `id` at an occupied row.
    #[must_use]
    pub fn component_bytes(&self, id: ComponentTypeId, row: usize) -> Option<&[u8]> {
        if !self.is_occupied(row) {
            return None;
        }
        let span = self.column(id)?.span(row);
        Some(&self.payload.as_bytes()[span])
    }

    /// Mutable raw bytes of component `id` at an occupied row.
    pub fn component_bytes_mut(&mut self, id: ComponentTypeId, row: usize) -> Option<&mut [u8]> {
        if !self.is_occupied(row) {
            return None;
        }
        let span = self.column(id)?.span(row);
        Some(&mut self.payload.as_bytes_mut()[span])
    }

    /// Splits the payload into disjoint per-column views of the enabled rows.
    pub fn columns_mut(&mut self) -> BlockColumnsMut<'_> {
        let capacity = self.capacity;
        let len = self.entity_count;
        let bytes = self.payload.as_bytes_mut();
        let (entity_bytes, mut rest) = bytes.split_at_mut(ENTITY_SIZE * capacity);
        let mut cursor = ENTITY_SIZE * capacity;
        let mut columns = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(column.offset - cursor);
            let width = column.descriptor.size * capacity;
            let (data, tail) = tail.split_at_mut(width);
            columns.push(ColumnSlot {
                descriptor: column.descriptor,
                bytes: data,
            });
            rest = tail;
            cursor = column.offset + width;
        }
        let entity_bytes: &[u8] = entity_bytes;
        let entities: &[Entity] = bytemuck::cast_slice(entity_bytes);
        BlockColumnsMut {
            len,
            entities: &entities[..len],
            columns,
        }
    }

    // ------------------------------------------------------------------------
    // Row operations
    // ------------------------------------------------------------------------

    /// Appends `entity` at row `entity_count` with default components.
    ///
    /// Returns the new row, or `None` when the block is full.
    pub fn push(&mut self, entity: Entity) -> Option<usize> {
        if !self.has_space() {
            return None;
        }
        let row = self.entity_count;
        self.set_entity(row, entity);
        let bytes = self.payload.as_bytes_mut();
        for column in &self.columns {
            column.descriptor.write_default(&mut bytes[column.span(row)]);
        }
        self.entity_count += 1;
        Some(row)
    }

    /// Swap-removes the enabled entity at `row`.
    ///
    /// The last enabled row moves into `row` and the vacated row is zeroed.
    /// Returns the moved entity, if any.
    pub fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        debug_assert!(row < self.entity_count, "Row {row} is not enabled");
        let last = self.entity_count - 1;
        let moved = (row != last).then(|| {
            self.copy_row(last, row);
            self.entity_slots()[row]
        });
        self.zero_row(last);
        self.entity_count -= 1;
        moved
    }

    /// Removes the disabled entity at `row`.
    ///
    /// The first disabled row moves into `row` and is zeroed. Returns the
    /// moved entity, if any.
    pub fn remove_disabled(&mut self, row: usize) -> Option<Entity> {
        debug_assert!(
            (self.disabled_start..self.capacity).contains(&row),
            "Row {row} is not disabled"
        );
        let first = self.disabled_start;
        let moved = (row != first).then(|| {
            self.copy_row(first, row);
            self.entity_slots()[row]
        });
        self.zero_row(first);
        self.disabled_start += 1;
        moved
    }

    /// Moves the enabled entity at `row` into the disabled partition.
    pub fn disable(&mut self, row: usize) -> RowTransfer {
        debug_assert!(row < self.entity_count, "Row {row} is not enabled");
        let last = self.entity_count - 1;
        let mut displaced = None;
        if row != last {
            self.swap_rows(row, last);
            displaced = Some((self.entity_slots()[row], row));
        }
        let target = self.disabled_start - 1;
        if target != last {
            self.copy_row(last, target);
            self.zero_row(last);
        }
        self.entity_count -= 1;
        self.disabled_start -= 1;
        RowTransfer {
            new_row: target,
            displaced,
        }
    }

    /// Moves the disabled entity at `row` back to the enabled partition.
    pub fn enable(&mut self, row: usize) -> RowTransfer {
        debug_assert!(
            (self.disabled_start..self.capacity).contains(&row),
            "Row {row} is not disabled"
        );
        let first = self.disabled_start;
        let mut displaced = None;
        if row != first {
            self.swap_rows(row, first);
            displaced = Some((self.entity_slots()[row], row));
        }
        let target = self.entity_count;
        if target != first {
            self.copy_row(first, target);
            self.zero_row(first);
        }
        self.entity_count += 1;
        self.disabled_start += 1;
        RowTransfer {
            new_row: target,
            displaced,
        }
    }

    /// Copies every component present in both blocks from `src[src_row]`
    /// into `self[dst_row]`.
    pub fn copy_shared_from(&mut self, dst_row: usize, src: &EntityBlock, src_row: usize) {
        let bytes = self.payload.as_bytes_mut();
        for column in &self.columns {
            if let Some(source) = src.column(column.id()) {
                bytes[column.span(dst_row)]
                    .copy_from_slice(&src.payload.as_bytes()[source.span(src_row)]);
            }
        }
    }

    fn copy_row(&mut self, from: usize, to: usize) {
        let bytes = self.payload.as_bytes_mut();
        for_each_span(&self.columns, |offset, size| {
            let src = offset + from * size;
            bytes.copy_within(src..src + size, offset + to * size);
        });
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let bytes = self.payload.as_bytes_mut();
        for_each_span(&self.columns, |offset, size| {
            let (head, tail) = bytes.split_at_mut(offset + hi * size);
            let lo_start = offset + lo * size;
            head[lo_start..lo_start + size].swap_with_slice(&mut tail[..size]);
        });
    }

    fn zero_row(&mut self, row: usize) {
        let bytes = self.payload.as_bytes_mut();
        for_each_span(&self.columns, |offset, size| {
            let start = offset + row * size;
            bytes[start..start + size].fill(0);
        });
    }
}

/// Calls `f(offset, size)` for the entity array and every column.
fn for_each_span(columns: &[Column], mut f: impl FnMut(usize, usize)) {
    f(0, ENTITY_SIZE);
    for column in columns {
        f(column.offset, column.descriptor.size);
    }
}

impl std::fmt::Debug for EntityBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityBlock")
            .field("signature", &self.signature)
            .field("capacity", &self.capacity)
            .field("entity_count", &self.entity_count)
            .field("disabled_start", &self.disabled_start)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DISJOINT COLUMN VIEWS
// ============================================================================

struct ColumnSlot<'a> {
    descriptor: ComponentDescriptor,
    bytes: &'a mut [u8],
}

/// Disjoint mutable column views over a block's enabled rows.
///
/// Each column can be taken once; a second take of the same component
/// returns `None`.
pub struct BlockColumnsMut<'a> {
    len: usize,
    entities: &'a [Entity],
    columns: Vec<ColumnSlot<'a>>,
}

impl<'a> BlockColumnsMut<'a> {
    /// Enabled entities in row order.
    #[must_use]
    pub fn entities(&self) -> &'a [Entity] {
        self.entities
    }

    /// Number of enabled rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no enabled rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Takes the column of `C`.
    pub fn take<C: Component>(&mut self) -> Option<&'a mut [C]> {
        let slot = self
            .columns
            .iter_mut()
            .find(|slot| slot.descriptor.id == C::ID && slot.descriptor.is::<C>())?;
        let bytes = std::mem::take(&mut slot.bytes);
        if bytes.is_empty() {
            return None;
        }
        let all: &'a mut [C] = bytemuck::cast_slice_mut(bytes);
        Some(&mut all[..self.len])
    }
}
