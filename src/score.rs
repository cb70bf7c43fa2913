//! The sampled state of the model and its score
//!
//! A score state holds the set of active terms and knows the (log) posterior
//! score of that set, up to a constant. It supports the primitives the
//! Metropolis-Hastings sampler in [`crate::mcmc`] needs:
//!
//! 1. [`Score::propose`] a random neighbor of the current state
//! 2. read the new [`Score::score`] and [`Score::neighborhood_size`]
//! 3. keep it or [`Score::undo_proposal`]
//! 4. [`Score::record`] the current state after the burn-in
//!
//! There are two implementations. [`BinaryScore`] models the study set as a
//! noisy observation of the items covered by the active terms.
//! [`ValuedScore`] uses a numerical value of every item instead.
use crate::params::HyperParameters;
use crate::f64_from_u64;

pub mod binary;
mod state;
pub mod valued;

pub use binary::BinaryScore;
pub use valued::{ValuedModel, ValuedScore};

/// The capabilities of a sampled state, as used by the MCMC driver
pub trait Score {
    /// Moves to a random neighbor of the current state
    ///
    /// `random_bits` selects the neighbor uniformly (modulo the size
    /// of the neighborhood).
    fn propose(&mut self, random_bits: u64);

    /// Reverts the last proposal
    ///
    /// Afterwards the state is identical to the state before the proposal.
    /// Calling it twice, or without a prior proposal, does nothing.
    fn undo_proposal(&mut self);

    /// The log score of the current state
    fn score(&self) -> f64;

    /// The number of states that can be reached by a single proposal
    fn neighborhood_size(&self) -> u64;

    /// The dense indices of all currently active terms, in ascending order
    fn active_terms(&self) -> Vec<usize>;

    /// Adds the current state to the sampling statistics
    fn record(&mut self);

    /// Switches a single term on or off, outside of the proposal mechanism
    ///
    /// This is used to set up the start state of a chain.
    fn switch_state(&mut self, term: usize);

    /// The number of terms that can be active
    fn term_count(&self) -> usize;

    /// The statistics that were recorded so far
    fn records(&self) -> &ScoreRecord;

    /// The hyperparameter values of the current state
    fn hyper_parameters(&self) -> HyperParameters {
        HyperParameters::default()
    }

    /// Average sufficient statistics for re-estimating the hyperparameters
    ///
    /// Returns `None` if the model has no such statistics or nothing
    /// was recorded yet.
    fn em_statistics(&self) -> Option<EmStatistics> {
        None
    }

    /// The recorded posterior distribution of all sampled hyperparameters
    fn param_histograms(&self) -> Vec<ParamHistogram> {
        Vec::new()
    }
}

/// The two kinds of score states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// [`BinaryScore`]
    Binary,
    /// [`ValuedScore`]
    Valued,
}

/// Counts of items by hidden (covered by an active term) and observed state
///
/// The first digit is the hidden state, the second one the observed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    /// Not covered, not in the study set
    pub n00: u64,
    /// Covered, but not in the study set (false negatives)
    pub n01: u64,
    /// Not covered, but in the study set (false positives)
    pub n10: u64,
    /// Covered and in the study set
    pub n11: u64,
}

impl ConfusionCounts {
    /// The sum of all counts, always equal to the number of items
    pub fn total(&self) -> u64 {
        self.n00 + self.n01 + self.n10 + self.n11
    }

    /// Moves one item between the covered and uncovered counts
    fn cover(&mut self, observed: bool, covered: bool) {
        match (observed, covered) {
            (true, true) => {
                self.n10 -= 1;
                self.n11 += 1;
            }
            (true, false) => {
                self.n11 -= 1;
                self.n10 += 1;
            }
            (false, true) => {
                self.n00 -= 1;
                self.n01 += 1;
            }
            (false, false) => {
                self.n01 -= 1;
                self.n00 += 1;
            }
        }
    }
}

/// Averages of the confusion counts and the number of active terms over all records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmStatistics {
    /// Average of [`ConfusionCounts::n00`]
    pub n00: f64,
    /// Average of [`ConfusionCounts::n01`]
    pub n01: f64,
    /// Average of [`ConfusionCounts::n10`]
    pub n10: f64,
    /// Average of [`ConfusionCounts::n11`]
    pub n11: f64,
    /// Average number of active terms
    pub active_terms: f64,
}

/// The recorded distribution of a sampled hyperparameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamHistogram {
    /// Name of the hyperparameter
    pub name: &'static str,
    /// The candidate values
    pub values: Vec<f64>,
    /// The posterior probability of each candidate value
    pub frequencies: Vec<f64>,
}

/// How often each term was active in the recorded states
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreRecord {
    activation_counts: Vec<u64>,
    num_records: u64,
}

impl ScoreRecord {
    pub(crate) fn new(term_count: usize) -> Self {
        Self {
            activation_counts: vec![0; term_count],
            num_records: 0,
        }
    }

    /// The number of recorded states in which the term was active
    pub fn activation_count(&self, term: usize) -> u64 {
        self.activation_counts[term]
    }

    /// The number of recorded states
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// The marginal posterior probability of the term
    ///
    /// Returns `0.0` if nothing was recorded.
    pub fn marginal(&self, term: usize) -> f64 {
        if self.num_records == 0 {
            return 0.0;
        }
        f64_from_u64(self.activation_counts[term]) / f64_from_u64(self.num_records)
    }
}

/// `ln(Σ exp(x))` without overflow
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Normalized probabilities from log weights
fn softmax(log_weights: &[f64]) -> Vec<f64> {
    let total = log_sum_exp(log_weights);
    log_weights.iter().map(|w| (w - total).exp()).collect()
}
