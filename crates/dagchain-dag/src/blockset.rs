use dagchain_primitives::Hash;
use std::collections::BTreeSet;
use std::collections::btree_set;

/// Ordered set of block identifiers.
///
/// Iteration is always ascending, so anything derived from a [`BlockSet`] is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSet<T: Ord = Hash> {
    inner: BTreeSet<T>,
}

impl<T: Ord> Default for BlockSet<T> {
    fn default() -> Self {
        Self {
            inner: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Copy> BlockSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding exactly `item`.
    pub fn with(item: T) -> Self {
        let mut set = Self::new();
        set.add(item);
        set
    }

    /// Returns `true` if the item was not present.
    pub fn add(&mut self, item: T) -> bool {
        self.inner.insert(item)
    }

    /// Returns `true` if the item was present.
    pub fn remove(&mut self, item: &T) -> bool {
        self.inner.remove(item)
    }

    pub fn has(&self, item: &T) -> bool {
        self.inner.contains(item)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> btree_set::Iter<'_, T> {
        self.inner.iter()
    }

    pub fn first(&self) -> Option<T> {
        self.inner.first().copied()
    }

    pub fn last(&self) -> Option<T> {
        self.inner.last().copied()
    }

    /// Returns `true` if the set holds `item` and nothing else.
    pub fn has_only(&self, item: &T) -> bool {
        self.len() == 1 && self.has(item)
    }

    /// Returns `true` if every item of `other` is in this set.
    pub fn contain(&self, other: &Self) -> bool {
        other.inner.is_subset(&self.inner)
    }

    pub fn add_set(&mut self, other: &Self) {
        self.inner.extend(other.inner.iter().copied());
    }

    pub fn remove_set(&mut self, other: &Self) {
        for item in other.iter() {
            self.inner.remove(item);
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.union(&other.inner).copied().collect(),
        }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.intersection(&other.inner).copied().collect(),
        }
    }

    /// Items of this set that are not in `other`.
    pub fn exclude(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.difference(&other.inner).copied().collect(),
        }
    }

    /// Items in ascending order.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.iter().copied().collect()
    }
}

impl<T: Ord> FromIterator<T> for BlockSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<T: Ord + Copy> Extend<T> for BlockSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.inner.extend(iter);
    }
}

impl<'a, T: Ord> IntoIterator for &'a BlockSet<T> {
    type Item = &'a T;
    type IntoIter = btree_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
