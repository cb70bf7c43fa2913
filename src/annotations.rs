//! Items, item sets and their links to terms
//!
//! This module is the boundary to the outside world. Parsing of ontologies
//! and annotation files happens elsewhere, callers fill [`Associations`]
//! with the already resolved annotations:
//!
//! - *direct* annotations are the terms an item is explicitly annotated to
//! - *total* annotations additionally contain all ancestors of the direct terms
//!
//! A [`TermEnumerator`] then restricts the associations to one [`ItemSet`],
//! e.g. the population or the study set.
use std::collections::{BTreeMap, HashMap};

use crate::{ItemId, TermId};

/// The terms that are linked to a single item
#[derive(Debug, Default, Clone)]
struct ItemTerms {
    total: Vec<TermId>,
    direct: Vec<TermId>,
}

/// Inserts `id` into the sorted vector, unless it is already present
fn insert_sorted(ids: &mut Vec<TermId>, id: TermId) -> bool {
    match ids.binary_search(&id) {
        Ok(_) => false,
        Err(idx) => {
            ids.insert(idx, id);
            true
        }
    }
}

/// Links between items and terms
///
/// # Examples
///
/// ```
/// use mgsa::{Associations, TermId};
///
/// let mut associations = Associations::new();
/// associations.add_direct("EZH2", TermId::from(5u32));
/// associations.add_total("EZH2", TermId::from(1u32));
///
/// assert_eq!(associations.len(), 1);
/// assert_eq!(associations.total_terms(&"EZH2".into()).unwrap().len(), 2);
/// assert_eq!(associations.direct_terms(&"EZH2".into()).unwrap().len(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Associations {
    items: HashMap<ItemId, ItemTerms>,
}

impl Associations {
    /// Constructs an empty [`Associations`] container
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a direct annotation of `item` to `term`
    ///
    /// Direct annotations are part of the total annotations as well
    pub fn add_direct<I: Into<ItemId>>(&mut self, item: I, term: TermId) -> bool {
        let terms = self.items.entry(item.into()).or_default();
        insert_sorted(&mut terms.total, term);
        insert_sorted(&mut terms.direct, term)
    }

    /// Adds an (indirect) annotation of `item` to `term`
    pub fn add_total<I: Into<ItemId>>(&mut self, item: I, term: TermId) -> bool {
        let terms = self.items.entry(item.into()).or_default();
        insert_sorted(&mut terms.total, term)
    }

    /// All terms that are linked to the item, directly or via their descendants
    pub fn total_terms(&self, item: &ItemId) -> Option<&[TermId]> {
        self.items.get(item).map(|terms| &terms.total[..])
    }

    /// All terms the item is directly annotated to
    pub fn direct_terms(&self, item: &ItemId) -> Option<&[TermId]> {
        self.items.get(item).map(|terms| &terms.direct[..])
    }

    /// Returns `true` if the item has at least one annotation
    pub fn contains(&self, item: &ItemId) -> bool {
        self.items.contains_key(item)
    }

    /// Returns the number of annotated items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no item is annotated
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates all annotated items in arbitrary order
    pub fn items(&self) -> impl Iterator<Item = &ItemId> {
        self.items.keys()
    }

    /// Enumerates all terms that are linked to at least one item of `set`
    pub fn enumerate(&self, set: &ItemSet) -> TermEnumerator {
        let mut terms: BTreeMap<TermId, TermAnnotatedItems> = BTreeMap::new();
        let mut items = Vec::new();
        for item in set {
            let Some(links) = self.items.get(item) else {
                continue;
            };
            if links.total.is_empty() {
                continue;
            }
            items.push(item.clone());
            for term in &links.total {
                terms.entry(*term).or_default().total.push(item.clone());
            }
            for term in &links.direct {
                terms.entry(*term).or_default().direct.push(item.clone());
            }
        }
        TermEnumerator { terms, items }
    }
}

/// An ordered set of items, e.g. the population or the study set
///
/// Items can carry a numerical value. A set in which every item
/// has a value is used for a valued calculation.
///
/// # Examples
///
/// ```
/// use mgsa::ItemSet;
///
/// let mut study = ItemSet::new();
/// assert!(study.insert("BRCA1"));
/// assert!(!study.insert("BRCA1"));
/// assert_eq!(study.len(), 1);
/// assert!(!study.is_valued());
///
/// let mut valued = ItemSet::new();
/// valued.insert_valued("BRCA1", 0.7);
/// assert!(valued.is_valued());
/// assert_eq!(valued.value(&"BRCA1".into()), Some(0.7));
/// ```
#[derive(Debug, Default, Clone)]
pub struct ItemSet {
    items: Vec<ItemId>,
    values: Vec<Option<f64>>,
    index: HashMap<ItemId, usize>,
}

impl ItemSet {
    /// Constructs a new, empty [`ItemSet`]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_inner(&mut self, item: ItemId, value: Option<f64>) -> bool {
        if self.index.contains_key(&item) {
            return false;
        }
        self.index.insert(item.clone(), self.items.len());
        self.items.push(item);
        self.values.push(value);
        true
    }

    /// Adds an item without value
    ///
    /// Returns `false` if the item was already present
    pub fn insert<I: Into<ItemId>>(&mut self, item: I) -> bool {
        self.insert_inner(item.into(), None)
    }

    /// Adds an item with a value
    ///
    /// Returns `false` if the item was already present. The value
    /// of an existing item is not changed
    pub fn insert_valued<I: Into<ItemId>>(&mut self, item: I, value: f64) -> bool {
        self.insert_inner(item.into(), Some(value))
    }

    /// Returns `true` if the item is part of the set
    pub fn contains(&self, item: &ItemId) -> bool {
        self.index.contains_key(item)
    }

    /// Returns the value of the item, if the item exists and has a value
    pub fn value(&self, item: &ItemId) -> Option<f64> {
        self.index.get(item).and_then(|idx| self.values[*idx])
    }

    /// Returns `true` if the set is not empty and every item has a value
    pub fn is_valued(&self) -> bool {
        !self.items.is_empty() && self.values.iter().all(Option::is_some)
    }

    /// Returns the number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the set does not contain any items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates the items in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, ItemId> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a ItemSet {
    type Item = &'a ItemId;
    type IntoIter = std::slice::Iter<'a, ItemId>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Into<ItemId>> FromIterator<T> for ItemSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = ItemSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

/// Items that are annotated to a single term
#[derive(Debug, Default, Clone)]
pub struct TermAnnotatedItems {
    total: Vec<ItemId>,
    direct: Vec<ItemId>,
}

impl TermAnnotatedItems {
    /// Items annotated to the term or any of its descendants
    pub fn total(&self) -> &[ItemId] {
        &self.total
    }

    /// Items directly annotated to the term
    pub fn direct(&self) -> &[ItemId] {
        &self.direct
    }

    /// Number of items annotated to the term or any of its descendants
    pub fn total_count(&self) -> usize {
        self.total.len()
    }
}

/// The terms that are annotated to the items of an [`ItemSet`]
///
/// Terms are enumerated in ascending [`TermId`] order, the items of each
/// term in the order of the underlying [`ItemSet`].
#[derive(Debug, Default, Clone)]
pub struct TermEnumerator {
    terms: BTreeMap<TermId, TermAnnotatedItems>,
    items: Vec<ItemId>,
}

impl TermEnumerator {
    /// Returns the annotated items of the term
    pub fn annotated_items(&self, term: TermId) -> Option<&TermAnnotatedItems> {
        self.terms.get(&term)
    }

    /// Returns the number of items annotated to the term, `0` if the term is unknown
    pub fn annotated_count(&self, term: TermId) -> usize {
        self.terms
            .get(&term)
            .map_or(0, TermAnnotatedItems::total_count)
    }

    /// All terms with at least one annotated item, in ascending order
    pub fn terms(&self) -> impl Iterator<Item = TermId> + '_ {
        self.terms.keys().copied()
    }

    /// All items of the set that have at least one annotation
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    /// Returns the number of enumerated terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns `true` if no term is annotated to the set
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn associations() -> Associations {
        let mut assoc = Associations::new();
        assoc.add_direct("a", 3u32.into());
        assoc.add_total("a", 1u32.into());
        assoc.add_direct("b", 2u32.into());
        assoc.add_total("b", 1u32.into());
        assoc.add_total("c", 1u32.into());
        assoc
    }

    #[test]
    fn direct_implies_total() {
        let assoc = associations();
        let terms = assoc.total_terms(&"a".into()).unwrap();
        assert_eq!(terms, &[TermId::from(1u32), TermId::from(3u32)]);
        assert_eq!(assoc.direct_terms(&"c".into()).unwrap().len(), 0);
        assert!(assoc.total_terms(&"z".into()).is_none());
    }

    #[test]
    fn enumerate_restricts_to_set() {
        let assoc = associations();
        let set: ItemSet = ["b", "a", "x"].into_iter().collect();
        let enumerator = assoc.enumerate(&set);

        assert_eq!(enumerator.items(), &[ItemId::from("b"), ItemId::from("a")]);
        let terms: Vec<u32> = enumerator.terms().map(|t| t.as_u32()).collect();
        assert_eq!(terms, vec![1, 2, 3]);

        let root = enumerator.annotated_items(1u32.into()).unwrap();
        assert_eq!(root.total(), &[ItemId::from("b"), ItemId::from("a")]);
        assert!(root.direct().is_empty());
        assert_eq!(enumerator.annotated_count(3u32.into()), 1);
        assert_eq!(enumerator.annotated_count(4u32.into()), 0);
    }

    #[test]
    fn valued_sets() {
        let mut set = ItemSet::new();
        assert!(!set.is_valued());
        set.insert_valued("a", 1.0);
        set.insert("b");
        assert!(!set.is_valued());
        assert_eq!(set.value(&"b".into()), None);
        assert!(set.contains(&"a".into()));
    }
}
