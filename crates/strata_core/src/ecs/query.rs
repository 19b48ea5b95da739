//! # Queries
//!
//! A query names a set of components (`&C`, `&mut C` or tuples of them).
//! Its signature selects every live block whose signature is a superset
//! and that holds at least one enabled entity; the iterator then walks
//! those blocks row by row, yielding `(Entity, item)`.
//!
//! Views hold a shared or exclusive borrow of the scene, so no structural
//! mutation can happen while one is alive.

use std::marker::PhantomData;
use std::slice;

use super::archetype::{BlockId, BlockList, BlockStore};
use super::block::{BlockColumnsMut, EntityBlock};
use super::component::{Component, ComponentTypeId};
use super::entity::Entity;
use super::signature::Signature;

// ============================================================================
// QUERY DATA
// ============================================================================

/// Something that can be fetched per row from a matching block.
pub trait QueryData {
    /// What the iterator yields per row.
    type Item<'a>;

    /// Per-block cursor.
    type Fetch<'a>;

    /// Appends the component IDs this query touches, in declaration order.
    fn component_ids(out: &mut Vec<ComponentTypeId>);

    /// Signature blocks must contain.
    fn signature() -> Signature {
        let mut ids = Vec::new();
        Self::component_ids(&mut ids);
        Signature::from_ids(&ids)
    }

    /// Builds a cursor from disjoint column views of one block.
    fn fetch_mut<'a>(columns: &mut BlockColumnsMut<'a>) -> Option<Self::Fetch<'a>>;

    /// Advances the cursor by one row.
    fn next<'a>(fetch: &mut Self::Fetch<'a>) -> Option<Self::Item<'a>>;
}

/// Query data that only reads, usable through a shared scene borrow.
pub trait ReadOnlyQueryData: QueryData {
    /// Builds a cursor from a shared block borrow.
    fn fetch(block: &EntityBlock) -> Option<Self::Fetch<'_>>;
}

impl<C: Component> QueryData for &C {
    type Item<'a> = &'a C;
    type Fetch<'a> = slice::Iter<'a, C>;

    fn component_ids(out: &mut Vec<ComponentTypeId>) {
        out.push(C::ID);
    }

    fn fetch_mut<'a>(columns: &mut BlockColumnsMut<'a>) -> Option<Self::Fetch<'a>> {
        let column: &'a [C] = columns.take::<C>()?;
        Some(column.iter())
    }

    #[inline]
    fn next<'a>(fetch: &mut Self::Fetch<'a>) -> Option<Self::Item<'a>> {
        fetch.next()
    }
}

impl<C: Component> ReadOnlyQueryData for &C {
    fn fetch(block: &EntityBlock) -> Option<Self::Fetch<'_>> {
        block.components::<C>().map(<[C]>::iter)
    }
}

impl<C: Component> QueryData for &mut C {
    type Item<'a> = &'a mut C;
    type Fetch<'a> = slice::IterMut<'a, C>;

    fn component_ids(out: &mut Vec<ComponentTypeId>) {
        out.push(C::ID);
    }

    fn fetch_mut<'a>(columns: &mut BlockColumnsMut<'a>) -> Option<Self::Fetch<'a>> {
        columns.take::<C>().map(<[C]>::iter_mut)
    }

    #[inline]
    fn next<'a>(fetch: &mut Self::Fetch<'a>) -> Option<Self::Item<'a>> {
        fetch.next()
    }
}

macro_rules! impl_query_tuple {
    ($($name:ident $fetch:ident),+) => {
        impl<$($name: QueryData),+> QueryData for ($($name,)+) {
            type Item<'a> = ($($name::Item<'a>,)+);
            type Fetch<'a> = ($($name::Fetch<'a>,)+);

            fn component_ids(out: &mut Vec<ComponentTypeId>) {
                $($name::component_ids(out);)+
            }

            fn fetch_mut<'a>(columns: &mut BlockColumnsMut<'a>) -> Option<Self::Fetch<'a>> {
                Some(($($name::fetch_mut(columns)?,)+))
            }

            #[inline]
            fn next<'a>(fetch: &mut Self::Fetch<'a>) -> Option<Self::Item<'a>> {
                let ($($fetch,)+) = fetch;
                Some(($($name::next($fetch)?,)+))
            }
        }

        impl<$($name: ReadOnlyQueryData),+> ReadOnlyQueryData for ($($name,)+) {
            fn fetch(block: &EntityBlock) -> Option<Self::Fetch<'_>> {
                Some(($($name::fetch(block)?,)+))
            }
        }
    };
}

impl_query_tuple!(A a);
impl_query_tuple!(A a, B b);
impl_query_tuple!(A a, B b, C c);
impl_query_tuple!(A a, B b, C c, D d);
impl_query_tuple!(A a, B b, C c, D d, E e);
impl_query_tuple!(A a, B b, C c, D d, E e, F f);

/// First component ID named twice by `Q`, if any.
pub(crate) fn first_duplicate<Q: QueryData>() -> Option<ComponentTypeId> {
    let mut ids = Vec::new();
    Q::component_ids(&mut ids);
    let mut seen = Signature::EMPTY;
    ids.into_iter().find(|&id| {
        let duplicate = seen.contains(id);
        seen.insert(id);
        duplicate
    })
}

// ============================================================================
// READ-ONLY VIEW
// ============================================================================

/// Read-only view over every enabled entity matching `Q`.
///
/// Restartable: each [`iter`](Self::iter) call walks the blocks from the
/// beginning.
pub struct QueryView<'s, Q: ReadOnlyQueryData> {
    store: &'s BlockStore,
    blocks: BlockList,
    _marker: PhantomData<fn() -> Q>,
}

impl<'s, Q: ReadOnlyQueryData> QueryView<'s, Q> {
    pub(crate) fn new(store: &'s BlockStore, blocks: BlockList) -> Self {
        Self {
            store,
            blocks,
            _marker: PhantomData,
        }
    }

    /// Matching blocks, ascending by id.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Number of entities the iterator will yield.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks
            .iter()
            .filter_map(|&id| self.store.get(id))
            .map(EntityBlock::entity_count)
            .sum()
    }

    /// Whether the view yields nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(Entity, item)` over all matching rows.
    #[must_use]
    pub fn iter(&self) -> QueryIter<'s, Q> {
        QueryIter {
            store: self.store,
            blocks: self.blocks.clone(),
            next_block: 0,
            entities: <&[Entity]>::default().iter(),
            fetch: None,
        }
    }
}

impl<'s, Q: ReadOnlyQueryData> IntoIterator for &QueryView<'s, Q> {
    type Item = (Entity, Q::Item<'s>);
    type IntoIter = QueryIter<'s, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator behind [`QueryView`].
pub struct QueryIter<'s, Q: ReadOnlyQueryData> {
    store: &'s BlockStore,
    blocks: BlockList,
    next_block: usize,
    entities: slice::Iter<'s, Entity>,
    fetch: Option<Q::Fetch<'s>>,
}

impl<'s, Q: ReadOnlyQueryData> Iterator for QueryIter<'s, Q> {
    type Item = (Entity, Q::Item<'s>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fetch) = self.fetch.as_mut() {
                if let Some(&entity) = self.entities.next() {
                    if let Some(item) = Q::next(fetch) {
                        return Some((entity, item));
                    }
                }
            }
            let id = *self.blocks.get(self.next_block)?;
            self.next_block += 1;
            let Some(block) = self.store.get(id) else {
                continue;
            };
            self.entities = block.entities().iter();
            self.fetch = Q::fetch(block);
        }
    }
}

// ============================================================================
// MUTABLE VIEW
// ============================================================================

/// Read-write view over every enabled entity matching `Q`.
pub struct QueryViewMut<'s, Q: QueryData> {
    slots: &'s mut [Option<EntityBlock>],
    blocks: BlockList,
    _marker: PhantomData<fn() -> Q>,
}

impl<'s, Q: QueryData> QueryViewMut<'s, Q> {
    pub(crate) fn new(store: &'s mut BlockStore, blocks: BlockList) -> Self {
        Self {
            slots: store.slots_mut(),
            blocks,
            _marker: PhantomData,
        }
    }

    /// Number of entities the iterator will yield.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks
            .iter()
            .filter_map(|id| self.slots.get(id.index())?.as_ref())
            .map(EntityBlock::entity_count)
            .sum()
    }

    /// Whether the view yields nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(Entity, item)` over all matching rows.
    pub fn iter_mut(&mut self) -> QueryIterMut<'_, Q> {
        QueryIterMut {
            slots: self.slots.iter_mut().enumerate(),
            blocks: self.blocks.clone(),
            next_block: 0,
            entities: <&[Entity]>::default().iter(),
            fetch: None,
        }
    }
}

impl<'v, 's, Q: QueryData> IntoIterator for &'v mut QueryViewMut<'s, Q> {
    type Item = (Entity, Q::Item<'v>);
    type IntoIter = QueryIterMut<'v, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Iterator behind [`QueryViewMut`].
pub struct QueryIterMut<'s, Q: QueryData> {
    slots: std::iter::Enumerate<slice::IterMut<'s, Option<EntityBlock>>>,
    blocks: BlockList,
    next_block: usize,
    entities: slice::Iter<'s, Entity>,
    fetch: Option<Q::Fetch<'s>>,
}

impl<'s, Q: QueryData> Iterator for QueryIterMut<'s, Q> {
    type Item = (Entity, Q::Item<'s>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fetch) = self.fetch.as_mut() {
                if let Some(&entity) = self.entities.next() {
                    if let Some(item) = Q::next(fetch) {
                        return Some((entity, item));
                    }
                }
            }
            // Block ids are ascending, so one forward pass over the slots
            // reaches every matching block.
            let target = self.blocks.get(self.next_block)?.index();
            self.next_block += 1;
            let (_, slot) = self.slots.find(|(index, _)| *index == target)?;
            let Some(block) = slot.as_mut() else {
                continue;
            };
            let mut columns = block.columns_mut();
            self.entities = columns.entities().iter();
            self.fetch = Q::fetch_mut(&mut columns);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Light, Transform};

    #[test]
    fn test_query_signature_and_duplicates() {
        assert_eq!(
            <(&Transform, &mut Light)>::signature(),
            Signature::from_ids(&[Transform::ID, Light::ID])
        );
        assert_eq!(first_duplicate::<(&Transform, &mut Light)>(), None);
        assert_eq!(
            first_duplicate::<(&Light, &Transform, &mut Light)>(),
            Some(Light::ID)
        );
    }
}
