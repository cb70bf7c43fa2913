//! The bipartite graph between terms and items
use crate::annotations::TermEnumerator;
use crate::mapper::IndexMapper;
use crate::{ItemId, TermId};

/// For every term (by dense index), the sorted dense indices of its items
///
/// Switching a single term on or off only touches the items listed here,
/// which keeps each sampling step proportional to the size of the term
/// instead of the size of the population.
///
/// # Examples
///
/// ```
/// use mgsa::TermLinks;
///
/// let links = TermLinks::new(vec![vec![2, 0], vec![1]], 3);
/// assert_eq!(links.items(0), &[0, 2]);
/// assert_eq!(links.term_count(), 2);
/// assert_eq!(links.item_count(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TermLinks {
    links: Vec<Vec<usize>>,
    items: usize,
}

impl TermLinks {
    /// Constructs a graph from per-term item lists
    ///
    /// The item lists are sorted and deduplicated.
    ///
    /// # Panics
    ///
    /// Panics if an item index is not smaller than `item_count`
    pub fn new(mut links: Vec<Vec<usize>>, item_count: usize) -> Self {
        for items in &mut links {
            items.sort_unstable();
            items.dedup();
            if let Some(max) = items.last() {
                assert!(*max < item_count, "item index {max} out of bounds");
            }
        }
        Self {
            links,
            items: item_count,
        }
    }

    /// Builds the graph for the `terms` universe from the enumerated annotations
    ///
    /// Items that are not known to `items` are ignored, terms without
    /// any enumerated items have no links.
    pub fn from_enumerator(
        enumerator: &TermEnumerator,
        terms: &IndexMapper<TermId>,
        items: &IndexMapper<ItemId>,
    ) -> Self {
        let links = terms
            .iter()
            .map(|term| {
                enumerator
                    .annotated_items(*term)
                    .map(|annotated| items.dense(annotated.total()))
                    .unwrap_or_default()
            })
            .collect();
        Self::new(links, items.len())
    }

    /// The items linked to the term with the dense index `term`
    pub fn items(&self, term: usize) -> &[usize] {
        &self.links[term]
    }

    /// The number of terms
    pub fn term_count(&self) -> usize {
        self.links.len()
    }

    /// The number of items
    pub fn item_count(&self) -> usize {
        self.items
    }
}
