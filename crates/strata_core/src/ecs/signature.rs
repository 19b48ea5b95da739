//! # Archetype Signatures
//!
//! A fixed-width bit set over the component ID space. Bit `i` set means the
//! archetype carries component `i`. Archetype identity is signature
//! equality; queries match by superset.

use std::fmt;

use super::component::{ComponentTypeId, MAX_COMPONENT_TYPES};

const WORDS: usize = MAX_COMPONENT_TYPES / 64;

/// Component-set bitmask (256 bits).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature {
    words: [u64; WORDS],
}

impl Signature {
    /// Signature with no components.
    pub const EMPTY: Self = Self { words: [0; WORDS] };

    /// Creates a signature from a list of IDs.
    #[must_use]
    pub fn from_ids(ids: &[ComponentTypeId]) -> Self {
        ids.iter().fold(Self::EMPTY, |sig, &id| sig.with(id))
    }

    /// Returns a copy with `id` set.
    #[inline]
    #[must_use]
    pub const fn with(mut self, id: ComponentTypeId) -> Self {
        let bit = id.index();
        self.words[bit / 64] |= 1 << (bit % 64);
        self
    }

    /// Returns a copy with `id` cleared.
    #[inline]
    #[must_use]
    pub const fn without(mut self, id: ComponentTypeId) -> Self {
        let bit = id.index();
        self.words[bit / 64] &= !(1 << (bit % 64));
        self
    }

    /// Sets `id` in place.
    #[inline]
    pub fn insert(&mut self, id: ComponentTypeId) {
        *self = self.with(id);
    }

    /// Checks if `id` is set.
    #[inline]
    #[must_use]
    pub const fn contains(&self, id: ComponentTypeId) -> bool {
        let bit = id.index();
        (self.words[bit / 64] >> (bit % 64)) & 1 == 1
    }

    /// `(self & other) == other`.
    #[inline]
    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(mine, theirs)| mine & theirs == *theirs)
    }

    /// Bitwise AND.
    #[inline]
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, theirs) in out.words.iter_mut().zip(other.words.iter()) {
            *word &= theirs;
        }
        out
    }

    /// Number of set bits.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether no bit is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Set IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                u8::try_from(word_idx * 64 + bit).ok().map(ComponentTypeId::new)
            })
        })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(ComponentTypeId::value)).finish()
    }
}

impl FromIterator<ComponentTypeId> for Signature {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u8) -> ComponentTypeId {
        ComponentTypeId::new(v)
    }

    #[test]
    fn test_set_clear_contains() {
        let sig = Signature::EMPTY.with(id(3)).with(id(200));
        assert!(sig.contains(id(3)));
        assert!(sig.contains(id(200)));
        assert!(!sig.contains(id(4)));
        assert_eq!(sig.len(), 2);

        let sig = sig.without(id(3));
        assert!(!sig.contains(id(3)));
        assert_eq!(sig.len(), 1);
    }

    #[test]
    fn test_superset_matching() {
        let block = Signature::from_ids(&[id(0), id(1), id(70)]);
        let query = Signature::from_ids(&[id(0), id(70)]);
        assert!(block.is_superset_of(&query));
        assert!(!query.is_superset_of(&block));
        assert!(block.is_superset_of(&Signature::EMPTY));
        assert_eq!(block.intersection(&query), query);
    }

    #[test]
    fn test_iter_is_ascending() {
        let sig = Signature::from_ids(&[id(255), id(64), id(0), id(63)]);
        let ids: Vec<u8> = sig.iter().map(ComponentTypeId::value).collect();
        assert_eq!(ids, vec![0, 63, 64, 255]);
        assert_eq!(sig.iter().collect::<Signature>(), sig);
    }
}
