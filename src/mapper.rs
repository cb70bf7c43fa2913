//! Dense integer indices for terms and items
//!
//! The sampler keeps all of its state in plain vectors. [`IndexMapper`]
//! translates between the external identifiers and the positions in
//! those vectors.
use std::collections::HashMap;
use std::hash::Hash;

/// An order preserving bijection between identifiers and `0..len`
///
/// The first identifier gets index `0`, the second `1` and so on.
/// Identifiers are expected to be unique, duplicates keep the index of
/// their first occurence and are not added a second time.
///
/// # Examples
///
/// ```
/// use mgsa::IndexMapper;
///
/// let mapper = IndexMapper::create(["b", "a", "c"]);
/// assert_eq!(mapper.len(), 3);
/// assert_eq!(mapper.index(&"a"), Some(1));
/// assert_eq!(mapper.get(2), Some(&"c"));
/// assert_eq!(mapper.index(&"d"), None);
/// ```
#[derive(Debug, Clone)]
pub struct IndexMapper<K> {
    ids: Vec<K>,
    indices: HashMap<K, usize>,
}

impl<K> Default for IndexMapper<K> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            indices: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> IndexMapper<K> {
    /// Constructs an [`IndexMapper`] from all identifiers in iteration order
    pub fn create<I: IntoIterator<Item = K>>(ids: I) -> Self {
        let iter = ids.into_iter();
        let mut mapper = Self {
            ids: Vec::with_capacity(iter.size_hint().0),
            indices: HashMap::with_capacity(iter.size_hint().0),
        };
        for id in iter {
            mapper.insert(id);
        }
        mapper
    }

    fn insert(&mut self, id: K) -> usize {
        if let Some(idx) = self.indices.get(&id) {
            return *idx;
        }
        let idx = self.ids.len();
        self.indices.insert(id.clone(), idx);
        self.ids.push(id);
        idx
    }

    /// Returns the dense index of the identifier
    pub fn index(&self, id: &K) -> Option<usize> {
        self.indices.get(id).copied()
    }

    /// Returns the identifier at the dense index
    pub fn get(&self, index: usize) -> Option<&K> {
        self.ids.get(index)
    }

    /// Returns the dense indices of all identifiers that are known to the mapper
    ///
    /// Unknown identifiers are skipped.
    pub fn dense<'a, I>(&self, ids: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        ids.into_iter().filter_map(|id| self.index(id)).collect()
    }

    /// Returns the number of identifiers
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if the mapper does not contain any identifiers
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates all identifiers in index order
    pub fn iter(&self) -> std::slice::Iter<'_, K> {
        self.ids.iter()
    }
}

impl<'a, K> IntoIterator for &'a IndexMapper<K> {
    type Item = &'a K;
    type IntoIter = std::slice::Iter<'a, K>;
    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}
