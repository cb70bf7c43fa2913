//! Study sets drawn from the MGSA model itself
//!
//! Useful to check that a calculation recovers the terms that were used
//! to generate the study set.
use rand::Rng;
use tracing::debug;

use crate::annotations::{Associations, ItemSet};
use crate::{ItemId, TermId};

/// A population and a study set generated from known active terms
///
/// The population contains all annotated items. Every item annotated to an
/// active term is part of the study set, unless it is dropped with the
/// false-negative rate of that term. Every other item enters the study set
/// with the false-positive rate `alpha`.
///
/// # Examples
///
/// ```
/// use rand::SeedableRng;
/// use rand_chacha::ChaCha8Rng;
/// use mgsa::{Associations, TermId};
/// use mgsa::simulate::SimulatedSetting;
///
/// let mut associations = Associations::new();
/// for gene in ["a", "b", "c"] {
///     associations.add_total(gene, TermId::from(1u32));
/// }
/// associations.add_total("d", TermId::from(2u32));
///
/// let mut rng = ChaCha8Rng::seed_from_u64(1);
/// let setting = SimulatedSetting::create(&mut rng, &[(TermId::from(1u32), 0.0)], 0.0, &associations);
/// assert_eq!(setting.population.len(), 4);
/// assert_eq!(setting.study.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedSetting {
    /// All annotated items
    pub population: ItemSet,
    /// The simulated observations
    pub study: ItemSet,
    /// The terms that generated the study set
    pub active_terms: Vec<TermId>,
}

impl SimulatedSetting {
    /// Draws a study set
    ///
    /// `active` lists the generating terms, each with its false-negative rate.
    pub fn create<R: Rng + ?Sized>(
        rng: &mut R,
        active: &[(TermId, f64)],
        alpha: f64,
        associations: &Associations,
    ) -> Self {
        // sorted, so that the same seed always draws the same study set
        let mut items: Vec<&ItemId> = associations.items().collect();
        items.sort_unstable();

        let mut study = ItemSet::new();
        for (term, beta) in active {
            for item in &items {
                let annotated = associations
                    .total_terms(item)
                    .map_or(false, |terms| terms.contains(term));
                if annotated && rng.gen::<f64>() >= *beta {
                    study.insert(*item);
                }
            }
        }
        let hidden = study.len();

        for item in &items {
            if !study.contains(item) && rng.gen::<f64>() < alpha {
                study.insert(*item);
            }
        }
        debug!(
            "Simulated {} study items, {} from active terms, {} false positives",
            study.len(),
            hidden,
            study.len() - hidden
        );

        Self {
            population: items.into_iter().collect(),
            study,
            active_terms: active.iter().map(|(term, _)| *term).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn associations() -> Associations {
        let mut associations = Associations::new();
        for i in 0..100 {
            associations.add_total(format!("g{i:03}"), TermId::from(i % 4 + 1));
        }
        associations
    }

    #[test]
    fn noise_free() {
        let associations = associations();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let setting = SimulatedSetting::create(&mut rng, &[(TermId::from(2u32), 0.0)], 0.0, &associations);
        assert_eq!(setting.population.len(), 100);
        assert_eq!(setting.study.len(), 25);
        assert!(setting.study.contains(&"g001".into()));
        assert!(!setting.study.contains(&"g000".into()));
        assert_eq!(setting.active_terms, vec![TermId::from(2u32)]);
    }

    #[test]
    fn all_false_negatives_and_positives() {
        let associations = associations();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let setting = SimulatedSetting::create(&mut rng, &[(TermId::from(2u32), 1.0)], 1.0, &associations);
        // every item is a false positive, since all active items were dropped first
        assert_eq!(setting.study.len(), 100);
    }

    #[test]
    fn same_seed_same_study() {
        let associations = associations();
        let draw = || {
            let mut rng = ChaCha8Rng::seed_from_u64(5);
            let setting =
                SimulatedSetting::create(&mut rng, &[(TermId::from(1u32), 0.3)], 0.1, &associations);
            setting.study.iter().cloned().collect::<Vec<ItemId>>()
        };
        let first = draw();
        assert_eq!(first, draw());
        assert!(!first.is_empty());
    }
}
