use smallvec::SmallVec;

use crate::graph::TermLinks;
use crate::score::ScoreRecord;

/// A single switched term and its former position in the active or inactive list
///
/// Keeping the position allows undoing the switch such that the lists
/// end up in exactly the same order as before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Switched {
    pub term: usize,
    pub position: usize,
}

/// The terms switched by one proposal. Exchange moves switch two terms.
pub(crate) type Switches = SmallVec<[Switched; 2]>;

/// Active terms, the resulting coverage of every item and the activation counts
///
/// Both score variants share this bookkeeping and differ only in how they
/// react to items becoming covered or uncovered.
#[derive(Debug, Clone)]
pub(crate) struct TermState<'a> {
    links: &'a TermLinks,
    active: Vec<bool>,
    /// Position of each term in `active_list` or `inactive_list`
    position: Vec<usize>,
    active_list: Vec<usize>,
    inactive_list: Vec<usize>,
    /// Number of active terms linked to each item
    hidden: Vec<u32>,
    record: ScoreRecord,
}

impl<'a> TermState<'a> {
    /// All terms start inactive
    pub fn new(links: &'a TermLinks) -> Self {
        let terms = links.term_count();
        Self {
            links,
            active: vec![false; terms],
            position: (0..terms).collect(),
            active_list: Vec::new(),
            inactive_list: (0..terms).collect(),
            hidden: vec![0; links.item_count()],
            record: ScoreRecord::new(terms),
        }
    }

    pub fn term_count(&self) -> usize {
        self.active.len()
    }

    pub fn item_count(&self) -> usize {
        self.hidden.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_list.len()
    }

    pub fn inactive_count(&self) -> usize {
        self.inactive_list.len()
    }

    /// The term at `position` of the active list
    pub fn active_at(&self, position: usize) -> usize {
        self.active_list[position]
    }

    /// The term at `position` of the inactive list
    pub fn inactive_at(&self, position: usize) -> usize {
        self.inactive_list[position]
    }

    pub fn is_covered(&self, item: usize) -> bool {
        self.hidden[item] > 0
    }

    pub fn active_terms(&self) -> Vec<usize> {
        let mut terms = self.active_list.clone();
        terms.sort_unstable();
        terms
    }

    pub fn record(&self) -> &ScoreRecord {
        &self.record
    }

    /// Increments the activation count of every active term and the record count
    pub fn record_activations(&mut self) {
        for term in &self.active_list {
            self.record.activation_counts[*term] += 1;
        }
        self.record.num_records += 1;
    }

    /// Switches `term` on or off
    ///
    /// `on_change` is called for every item whose coverage changes, with
    /// the new coverage.
    ///
    /// # Panics
    ///
    /// Panics if `term` is not a valid term index
    pub fn switch<F: FnMut(usize, bool)>(&mut self, term: usize, on_change: F) -> Switched {
        let now_active = !self.active[term];
        let position = self.position[term];
        let (from, to) = if now_active {
            (&mut self.inactive_list, &mut self.active_list)
        } else {
            (&mut self.active_list, &mut self.inactive_list)
        };
        from.swap_remove(position);
        if let Some(moved) = from.get(position) {
            self.position[*moved] = position;
        }
        to.push(term);
        self.position[term] = to.len() - 1;

        self.active[term] = now_active;
        self.update_coverage(term, now_active, on_change);
        Switched { term, position }
    }

    /// Reverts a [`TermState::switch`]
    ///
    /// Switches must be reverted in the reverse order of their application.
    pub fn unswitch<F: FnMut(usize, bool)>(&mut self, switched: Switched, on_change: F) {
        let Switched { term, position } = switched;
        let now_active = !self.active[term];
        // `to` is the list the term originally came from
        let (from, to) = if now_active {
            (&mut self.inactive_list, &mut self.active_list)
        } else {
            (&mut self.active_list, &mut self.inactive_list)
        };
        let popped = from.pop();
        debug_assert_eq!(popped, Some(term), "switches must be undone in reverse order");
        to.push(term);
        let last = to.len() - 1;
        to.swap(position, last);
        self.position[to[position]] = position;
        self.position[to[last]] = last;

        self.active[term] = now_active;
        self.update_coverage(term, now_active, on_change);
    }

    fn update_coverage<F: FnMut(usize, bool)>(&mut self, term: usize, active: bool, mut on_change: F) {
        let links = self.links;
        for item in links.items(term) {
            let hidden = &mut self.hidden[*item];
            if active {
                *hidden += 1;
                if *hidden == 1 {
                    on_change(*item, true);
                }
            } else {
                *hidden -= 1;
                if *hidden == 0 {
                    on_change(*item, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> TermLinks {
        TermLinks::new(vec![vec![0, 1], vec![1, 2], vec![3]], 4)
    }

    #[test]
    fn switching_updates_coverage() {
        let links = links();
        let mut state = TermState::new(&links);
        let mut changes = Vec::new();
        state.switch(0, |item, covered| changes.push((item, covered)));
        assert_eq!(changes, vec![(0, true), (1, true)]);

        changes.clear();
        state.switch(1, |item, covered| changes.push((item, covered)));
        // item 1 was already covered
        assert_eq!(changes, vec![(2, true)]);
        assert_eq!(state.active_terms(), vec![0, 1]);

        changes.clear();
        state.switch(0, |item, covered| changes.push((item, covered)));
        assert_eq!(changes, vec![(0, false)]);
        assert!(state.is_covered(1));
        assert_eq!(state.active_count(), 1);
        assert_eq!(state.inactive_count(), 2);
    }

    #[test]
    fn unswitch_restores_list_order() {
        let links = links();
        let mut state = TermState::new(&links);
        state.switch(2, |_, _| ());
        state.switch(0, |_, _| ());
        let before = (state.active_list.clone(), state.inactive_list.clone(), state.position.clone());

        let first = state.switch(2, |_, _| ());
        let second = state.switch(1, |_, _| ());
        state.unswitch(second, |_, _| ());
        state.unswitch(first, |_, _| ());

        assert_eq!(
            (state.active_list.clone(), state.inactive_list.clone(), state.position.clone()),
            before
        );
        assert_eq!(state.hidden, vec![1, 1, 0, 1]);
    }

    #[test]
    fn records() {
        let links = links();
        let mut state = TermState::new(&links);
        state.record_activations();
        state.switch(1, |_, _| ());
        state.record_activations();
        assert_eq!(state.record().num_records(), 2);
        assert_eq!(state.record().activation_count(1), 1);
        assert_eq!(state.record().activation_count(0), 0);
    }
}
