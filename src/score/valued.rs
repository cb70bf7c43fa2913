//! The score of the MGSA model for items with numerical values
//!
//! Instead of a binary study set, every item carries a value, e.g. a
//! fold change or a test statistic. Values are standardized across all
//! items. Items covered by an active term are assumed to follow a
//! normal distribution around `covered_mean`, all other items one around
//! `uncovered_mean`.
use statrs::distribution::{Continuous, Normal};

use crate::graph::TermLinks;
use crate::params::HyperParameters;
use crate::score::state::{Switched, Switches, TermState};
use crate::score::{Score, ScoreRecord};
use crate::{f64_from_usize, MgsaError, MgsaResult, PARAM_MAX, PARAM_MIN};

/// The distributions of standardized values of covered and uncovered items
///
/// # Examples
///
/// ```
/// use mgsa::score::ValuedModel;
///
/// let model = ValuedModel::default();
/// assert_eq!(model.covered_mean(), 1.0);
/// assert!(ValuedModel::new(1.0, 0.0, 0.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuedModel {
    covered_mean: f64,
    uncovered_mean: f64,
    sd: f64,
}

impl Default for ValuedModel {
    fn default() -> Self {
        Self {
            covered_mean: 1.0,
            uncovered_mean: 0.0,
            sd: 1.0,
        }
    }
}

impl ValuedModel {
    /// Constructs a new model
    ///
    /// # Errors
    ///
    /// Returns [`MgsaError::InvalidParameter`] unless `sd` is positive
    /// and both means are finite
    pub fn new(covered_mean: f64, uncovered_mean: f64, sd: f64) -> MgsaResult<Self> {
        let model = Self {
            covered_mean,
            uncovered_mean,
            sd,
        };
        model.distributions()?;
        Ok(model)
    }

    /// Mean of the standardized values of covered items
    pub fn covered_mean(&self) -> f64 {
        self.covered_mean
    }

    /// Mean of the standardized values of uncovered items
    pub fn uncovered_mean(&self) -> f64 {
        self.uncovered_mean
    }

    /// Standard deviation of both distributions
    pub fn sd(&self) -> f64 {
        self.sd
    }

    fn distributions(&self) -> MgsaResult<(Normal, Normal)> {
        let invalid = |e: statrs::StatsError| MgsaError::InvalidParameter(e.to_string());
        Ok((
            Normal::new(self.covered_mean, self.sd).map_err(invalid)?,
            Normal::new(self.uncovered_mean, self.sd).map_err(invalid)?,
        ))
    }

    /// The log density of every standardized value, if covered and if uncovered
    fn log_densities(&self, values: &[f64]) -> MgsaResult<(Vec<f64>, Vec<f64>)> {
        let (covered, uncovered) = self.distributions()?;
        let standardized = standardize(values);
        Ok((
            standardized.iter().map(|v| covered.ln_pdf(*v)).collect(),
            standardized.iter().map(|v| uncovered.ln_pdf(*v)).collect(),
        ))
    }
}

/// Z-scores of the values
///
/// Values without any spread are only centered.
fn standardize(values: &[f64]) -> Vec<f64> {
    let n = f64_from_usize(values.len()).max(1.0);
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let sd = if var > 0.0 { var.sqrt() } else { 1.0 };
    values.iter().map(|v| (v - mean) / sd).collect()
}

#[derive(Debug, Clone)]
struct Proposal {
    switched: Switches,
    log_likelihood: f64,
    score: f64,
}

/// The score state for items with numerical values
#[derive(Debug, Clone)]
pub struct ValuedScore<'a> {
    state: TermState<'a>,
    covered: Vec<f64>,
    uncovered: Vec<f64>,
    log_likelihood: f64,
    p: f64,
    use_prior: bool,
    exchange_moves: bool,
    score: f64,
    last: Option<Proposal>,
}

impl<'a> ValuedScore<'a> {
    /// Constructs the score state with all terms inactive
    ///
    /// `values` holds the value of every item, by dense index.
    ///
    /// # Errors
    ///
    /// Returns [`MgsaError::InvalidParameter`] if the number of values does not
    /// match the number of items or the model is invalid.
    pub fn new(
        links: &'a TermLinks,
        values: &[f64],
        model: &ValuedModel,
        expected_number_of_terms: f64,
    ) -> MgsaResult<Self> {
        if values.len() != links.item_count() {
            return Err(MgsaError::InvalidParameter(format!(
                "{} values for {} items",
                values.len(),
                links.item_count()
            )));
        }
        let (covered, uncovered) = model.log_densities(values)?;
        let log_likelihood = uncovered.iter().sum();
        let terms = f64_from_usize(links.term_count()).max(1.0);
        let mut score = Self {
            state: TermState::new(links),
            covered,
            uncovered,
            log_likelihood,
            p: (expected_number_of_terms / terms).clamp(PARAM_MIN, PARAM_MAX),
            use_prior: true,
            exchange_moves: false,
            score: 0.0,
            last: None,
        };
        score.score = score.calculate_score();
        Ok(score)
    }

    /// Include the prior on the number of active terms in the score (default `true`)
    pub fn set_use_prior(&mut self, use_prior: bool) {
        self.use_prior = use_prior;
        self.score = self.calculate_score();
    }

    /// Allow proposals that exchange an active with an inactive term (default `false`)
    pub fn set_exchange_moves(&mut self, exchange_moves: bool) {
        self.exchange_moves = exchange_moves;
    }

    /// The log likelihood of all item values given the current coverage
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    fn calculate_score(&self) -> f64 {
        let mut score = self.log_likelihood;
        if self.use_prior {
            let active = f64_from_usize(self.state.active_count());
            let inactive = f64_from_usize(self.state.inactive_count());
            score += active * self.p.ln() + inactive * (1.0 - self.p).ln();
        }
        score
    }

    fn switch(&mut self, term: usize) -> Switched {
        let (covered, uncovered) = (&self.covered, &self.uncovered);
        let log_likelihood = &mut self.log_likelihood;
        self.state.switch(term, |item, now_covered| {
            if now_covered {
                *log_likelihood += covered[item] - uncovered[item];
            } else {
                *log_likelihood += uncovered[item] - covered[item];
            }
        })
    }

    fn exchange_count(&self) -> u64 {
        if self.exchange_moves {
            (self.state.active_count() * self.state.inactive_count()) as u64
        } else {
            0
        }
    }

    /// Sums the log densities of all items from scratch
    #[cfg(test)]
    fn recalculated_log_likelihood(&self) -> f64 {
        (0..self.state.item_count())
            .map(|item| {
                if self.state.is_covered(item) {
                    self.covered[item]
                } else {
                    self.uncovered[item]
                }
            })
            .sum()
    }
}

impl Score for ValuedScore<'_> {
    fn propose(&mut self, random_bits: u64) {
        let neighborhood = self.neighborhood_size();
        if neighborhood == 0 {
            self.last = None;
            return;
        }
        let previous = Proposal {
            switched: Switches::new(),
            log_likelihood: self.log_likelihood,
            score: self.score,
        };
        let terms = self.state.term_count() as u64;
        let choice = random_bits % neighborhood;

        let mut switched = Switches::new();
        if choice < terms {
            switched.push(self.switch(choice as usize));
        } else {
            let pair = choice - terms;
            let inactive_count = self.state.inactive_count() as u64;
            let active = self.state.active_at((pair / inactive_count) as usize);
            let inactive = self.state.inactive_at((pair % inactive_count) as usize);
            switched.push(self.switch(active));
            switched.push(self.switch(inactive));
        }
        self.score = self.calculate_score();
        self.last = Some(Proposal {
            switched,
            ..previous
        });
    }

    fn undo_proposal(&mut self) {
        let Some(proposal) = self.last.take() else {
            return;
        };
        for switched in proposal.switched.into_iter().rev() {
            self.state.unswitch(switched, |_, _| ());
        }
        // restoring the sums instead of subtracting keeps them bit-identical
        self.log_likelihood = proposal.log_likelihood;
        self.score = proposal.score;
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn neighborhood_size(&self) -> u64 {
        self.state.term_count() as u64 + self.exchange_count()
    }

    fn active_terms(&self) -> Vec<usize> {
        self.state.active_terms()
    }

    fn record(&mut self) {
        self.state.record_activations();
    }

    fn switch_state(&mut self, term: usize) {
        self.switch(term);
        self.last = None;
        self.score = self.calculate_score();
    }

    fn term_count(&self) -> usize {
        self.state.term_count()
    }

    fn records(&self) -> &ScoreRecord {
        self.state.record()
    }

    fn hyper_parameters(&self) -> HyperParameters {
        HyperParameters {
            alpha: None,
            beta: None,
            expected_number_of_terms: Some(self.p * f64_from_usize(self.state.term_count())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn setup() -> (TermLinks, Vec<f64>) {
        let links = TermLinks::new(
            vec![vec![0, 1, 2], vec![2, 3, 4, 5], vec![6, 7], (0..12).step_by(2).collect()],
            12,
        );
        let values = vec![3.0, 2.5, 2.8, 0.1, -0.2, 0.3, 0.0, -0.1, 0.2, 0.1, -0.3, 0.05];
        (links, values)
    }

    #[test]
    fn standardized_values() {
        let z = standardize(&[1.0, 2.0, 3.0]);
        assert!(z[1].abs() < 1e-12);
        assert!((z[2] + z[0]).abs() < 1e-12);
        assert_eq!(standardize(&[4.0, 4.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn high_values_prefer_coverage() {
        let (links, values) = setup();
        let mut score = ValuedScore::new(&links, &values, &ValuedModel::default(), 1.0).unwrap();
        score.set_use_prior(false);
        let empty = score.score();
        score.switch_state(0);
        assert!(score.score() > empty);
        score.switch_state(0);
        score.switch_state(2);
        assert!(score.score() < empty);
    }

    #[test]
    fn propose_undo_is_exact() {
        let (links, values) = setup();
        let mut score = ValuedScore::new(&links, &values, &ValuedModel::default(), 2.0).unwrap();
        score.set_exchange_moves(true);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..5000 {
            let value = score.score();
            let active = score.active_terms();
            score.propose(rng.gen());
            score.undo_proposal();
            assert_eq!(score.score().to_bits(), value.to_bits());
            assert_eq!(score.active_terms(), active);
            score.propose(rng.gen());
        }
        let fresh = score.recalculated_log_likelihood();
        assert!((fresh - score.log_likelihood()).abs() < 1e-9);
    }

    #[test]
    fn value_count_must_match() {
        let (links, values) = setup();
        assert!(ValuedScore::new(&links, &values[1..], &ValuedModel::default(), 1.0).is_err());
    }

    #[test]
    fn nan_values_give_nan_score() {
        let (links, mut values) = setup();
        values[4] = f64::NAN;
        let score = ValuedScore::new(&links, &values, &ValuedModel::default(), 1.0).unwrap();
        assert!(score.score().is_nan());
    }

    #[test]
    fn records_and_params() {
        let (links, values) = setup();
        let mut score = ValuedScore::new(&links, &values, &ValuedModel::default(), 2.0).unwrap();
        score.switch_state(1);
        score.record();
        assert_eq!(score.records().activation_count(1), 1);
        assert!(score.em_statistics().is_none());
        let params = score.hyper_parameters();
        assert!((params.expected_number_of_terms.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(params.alpha, None);
    }
}
