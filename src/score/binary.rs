//! The score of the MGSA model with a binary (in / not in the study set) observation
//!
//! Every item is *covered* if at least one active term is annotated to it.
//! Membership in the study set is a noisy observation of the coverage:
//! an uncovered item is observed with the false-positive rate `alpha`,
//! a covered item is missed with the false-negative rate `beta`.
//! Given the [`ConfusionCounts`] of the current state, the log likelihood is
//!
//! ```text
//! n10 ln(α) + n00 ln(1 - α) + n01 ln(β) + n11 ln(1 - β)
//! ```
//!
//! Each of the `m` terms is active with prior probability `p = expected / m`,
//! so `k` active terms add `k ln(p) + (m - k) ln(1 - p)`.
use tracing::debug;

use crate::graph::TermLinks;
use crate::params::{ChainParam, ChainParams, HyperParameters};
use crate::score::state::{Switched, Switches, TermState};
use crate::score::{
    log_sum_exp, softmax, ConfusionCounts, EmStatistics, ParamHistogram, Score, ScoreRecord,
};
use crate::{f64_from_u64, f64_from_usize, PARAM_MAX, PARAM_MIN};

/// A hyperparameter of the score
#[derive(Debug, Clone)]
enum Slot {
    Value(f64),
    Grid {
        values: Vec<f64>,
        idx: usize,
        histogram: Vec<f64>,
    },
}

impl Slot {
    fn new(param: &ChainParam) -> Self {
        match param {
            ChainParam::Value(v) => Slot::Value(*v),
            ChainParam::Grid(values) => Slot::Grid {
                histogram: vec![0.0; values.len()],
                values: values.clone(),
                idx: 0,
            },
        }
    }

    fn current(&self) -> f64 {
        match self {
            Slot::Value(v) => *v,
            Slot::Grid { values, idx, .. } => values[*idx],
        }
    }

    /// The number of alternative values a proposal can move to
    fn alternatives(&self) -> u64 {
        match self {
            Slot::Value(_) => 0,
            Slot::Grid { values, .. } => values.len() as u64 - 1,
        }
    }

    fn is_grid(&self) -> bool {
        matches!(self, Slot::Grid { .. })
    }

    fn set_idx(&mut self, new_idx: usize) -> Option<usize> {
        match self {
            Slot::Value(_) => None,
            Slot::Grid { idx, .. } => Some(std::mem::replace(idx, new_idx)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    Alpha,
    Beta,
    ExpectedTerms,
}

/// Everything needed to revert a proposal
#[derive(Debug, Clone)]
struct Proposal {
    switched: Switches,
    param: Option<(Param, usize)>,
    score: f64,
}

/// Sums over all records, used for EM
#[derive(Debug, Clone, Default)]
struct Totals {
    n00: u64,
    n01: u64,
    n10: u64,
    n11: u64,
    active_terms: u64,
}

/// The score state for a study set that is a noisy observation of the active terms
///
/// # Examples
///
/// ```
/// use mgsa::TermLinks;
/// use mgsa::params::{ChainParam, ChainParams};
/// use mgsa::score::{BinaryScore, Score};
///
/// // two terms with 3 and 2 items, items 0, 1, 2 are in the study set
/// let links = TermLinks::new(vec![vec![0, 1, 2], vec![3, 4]], 6);
/// let params = ChainParams {
///     alpha: ChainParam::Value(0.1),
///     beta: ChainParam::Value(0.1),
///     expected_number_of_terms: ChainParam::Value(1.0),
/// };
/// let mut score = BinaryScore::new(&links, &[0, 1, 2], &params);
///
/// let empty = score.score();
/// score.switch_state(0);
/// assert!(score.score() > empty);
/// assert_eq!(score.counts().n11, 3);
/// ```
#[derive(Debug, Clone)]
pub struct BinaryScore<'a> {
    state: TermState<'a>,
    observed: Vec<bool>,
    counts: ConfusionCounts,
    alpha: Slot,
    beta: Slot,
    expected_terms: Slot,
    use_prior: bool,
    integrate_params: bool,
    exchange_moves: bool,
    score: f64,
    last: Option<Proposal>,
    totals: Totals,
}

impl<'a> BinaryScore<'a> {
    /// Constructs the score state with all terms inactive
    ///
    /// `study` contains the dense indices of the observed items, indices
    /// beyond the items of `links` are ignored.
    pub fn new(links: &'a TermLinks, study: &[usize], params: &ChainParams) -> Self {
        let state = TermState::new(links);
        let mut observed = vec![false; state.item_count()];
        for item in study {
            if let Some(o) = observed.get_mut(*item) {
                *o = true;
            }
        }
        let n10 = observed.iter().filter(|o| **o).count() as u64;
        let counts = ConfusionCounts {
            n00: observed.len() as u64 - n10,
            n01: 0,
            n10,
            n11: 0,
        };
        let mut score = Self {
            state,
            observed,
            counts,
            alpha: Slot::new(&params.alpha),
            beta: Slot::new(&params.beta),
            expected_terms: Slot::new(&params.expected_number_of_terms),
            use_prior: true,
            integrate_params: false,
            exchange_moves: false,
            score: 0.0,
            last: None,
            totals: Totals::default(),
        };
        score.score = score.calculate_score();
        score
    }

    /// Include the prior on the number of active terms in the score (default `true`)
    pub fn set_use_prior(&mut self, use_prior: bool) {
        self.use_prior = use_prior;
        self.score = self.calculate_score();
    }

    /// Integrate sampled hyperparameters out instead of sampling them (default `false`)
    pub fn set_integrate_params(&mut self, integrate_params: bool) {
        self.integrate_params = integrate_params;
        self.score = self.calculate_score();
    }

    /// Allow proposals that exchange an active with an inactive term (default `false`)
    pub fn set_exchange_moves(&mut self, exchange_moves: bool) {
        self.exchange_moves = exchange_moves;
    }

    /// The current confusion counts
    pub fn counts(&self) -> ConfusionCounts {
        self.counts
    }

    /// The current false-positive rate, `NaN` if it is integrated out
    pub fn alpha(&self) -> f64 {
        self.point_value(&self.alpha)
    }

    /// The current false-negative rate, `NaN` if it is integrated out
    pub fn beta(&self) -> f64 {
        self.point_value(&self.beta)
    }

    /// The current prior probability of a term to be active, `NaN` if it is integrated out
    pub fn p(&self) -> f64 {
        let expected = self.point_value(&self.expected_terms);
        self.prior_p(expected)
    }

    fn point_value(&self, slot: &Slot) -> f64 {
        if self.is_integrated(slot) {
            f64::NAN
        } else {
            slot.current()
        }
    }

    fn is_integrated(&self, slot: &Slot) -> bool {
        self.integrate_params && slot.is_grid()
    }

    fn is_moved(&self, slot: &Slot) -> bool {
        !self.integrate_params && slot.is_grid()
    }

    fn prior_p(&self, expected: f64) -> f64 {
        let terms = f64_from_usize(self.state.term_count()).max(1.0);
        (expected / terms).clamp(PARAM_MIN, PARAM_MAX)
    }

    /// The candidate values that enter the score for a slot
    fn score_values<'s>(&self, slot: &'s Slot) -> &'s [f64] {
        match slot {
            Slot::Grid { values, .. } if self.integrate_params => values,
            Slot::Grid { values, idx, .. } => std::slice::from_ref(&values[*idx]),
            Slot::Value(v) => std::slice::from_ref(v),
        }
    }

    fn log_likelihood(&self, alpha: f64, beta: f64) -> f64 {
        let c = &self.counts;
        f64_from_u64(c.n10) * alpha.ln()
            + f64_from_u64(c.n00) * (1.0 - alpha).ln()
            + f64_from_u64(c.n01) * beta.ln()
            + f64_from_u64(c.n11) * (1.0 - beta).ln()
    }

    fn log_prior(&self, expected: f64) -> f64 {
        let p = self.prior_p(expected);
        let active = f64_from_usize(self.state.active_count());
        let inactive = f64_from_usize(self.state.inactive_count());
        active * p.ln() + inactive * (1.0 - p).ln()
    }

    /// The log likelihood for every combination of `alpha` and `beta` values (row-major by alpha)
    fn likelihood_matrix(&self) -> Vec<f64> {
        let betas = self.score_values(&self.beta);
        self.score_values(&self.alpha)
            .iter()
            .flat_map(|a| betas.iter().map(move |b| (*a, *b)))
            .map(|(a, b)| self.log_likelihood(a, b))
            .collect()
    }

    fn prior_vector(&self) -> Vec<f64> {
        self.score_values(&self.expected_terms)
            .iter()
            .map(|e| self.log_prior(*e))
            .collect()
    }

    /// Computes the score from the current counts and hyperparameters
    ///
    /// Integrated parameters contribute the log of the mean likelihood
    /// over their candidate values.
    fn calculate_score(&self) -> f64 {
        let likelihoods = self.likelihood_matrix();
        let mut score = if likelihoods.len() == 1 {
            likelihoods[0]
        } else {
            log_sum_exp(&likelihoods) - f64_from_usize(likelihoods.len()).ln()
        };
        if self.use_prior {
            let priors = self.prior_vector();
            score += if priors.len() == 1 {
                priors[0]
            } else {
                log_sum_exp(&priors) - f64_from_usize(priors.len()).ln()
            };
        }
        score
    }

    /// Switches a term and updates the confusion counts
    fn switch(&mut self, term: usize) -> Switched {
        let observed = &self.observed;
        let counts = &mut self.counts;
        self.state
            .switch(term, |item, covered| counts.cover(observed[item], covered))
    }

    fn unswitch(&mut self, switched: Switched) {
        let observed = &self.observed;
        let counts = &mut self.counts;
        self.state
            .unswitch(switched, |item, covered| counts.cover(observed[item], covered))
    }

    fn slot_mut(&mut self, param: Param) -> &mut Slot {
        match param {
            Param::Alpha => &mut self.alpha,
            Param::Beta => &mut self.beta,
            Param::ExpectedTerms => &mut self.expected_terms,
        }
    }

    fn exchange_count(&self) -> u64 {
        if self.exchange_moves {
            (self.state.active_count() * self.state.inactive_count()) as u64
        } else {
            0
        }
    }

    /// Moves a sampled hyperparameter to the `choice`-th alternative value
    fn propose_param(&mut self, mut choice: u64) -> Option<(Param, usize)> {
        for param in [Param::Alpha, Param::Beta, Param::ExpectedTerms] {
            let slot = match param {
                Param::Alpha => &self.alpha,
                Param::Beta => &self.beta,
                Param::ExpectedTerms => &self.expected_terms,
            };
            let Slot::Grid { values, idx, .. } = slot else {
                continue;
            };
            if self.integrate_params {
                continue;
            }
            let current = *idx;
            let alternatives = values.len() as u64 - 1;
            if choice < alternatives {
                // skip the current value
                let mut new_idx = choice as usize;
                if new_idx >= current {
                    new_idx += 1;
                }
                return self
                    .slot_mut(param)
                    .set_idx(new_idx)
                    .map(|old| (param, old));
            }
            choice -= alternatives;
        }
        None
    }

    fn record_histograms(&mut self) {
        if self.integrate_params {
            let likelihoods = self.likelihood_matrix();
            let n_betas = self.score_values(&self.beta).len();
            if self.alpha.is_grid() {
                let rows: Vec<f64> = likelihoods
                    .chunks(n_betas)
                    .map(log_sum_exp)
                    .collect();
                add_weights(&mut self.alpha, &softmax(&rows));
            }
            if self.beta.is_grid() {
                let n_alphas = likelihoods.len() / n_betas;
                let cols: Vec<f64> = (0..n_betas)
                    .map(|j| {
                        let col: Vec<f64> =
                            (0..n_alphas).map(|i| likelihoods[i * n_betas + j]).collect();
                        log_sum_exp(&col)
                    })
                    .collect();
                add_weights(&mut self.beta, &softmax(&cols));
            }
            if self.expected_terms.is_grid() {
                let weights = if self.use_prior {
                    softmax(&self.prior_vector())
                } else {
                    let n = self.score_values(&self.expected_terms).len();
                    vec![1.0 / f64_from_usize(n); n]
                };
                add_weights(&mut self.expected_terms, &weights);
            }
        } else {
            for slot in [&mut self.alpha, &mut self.beta, &mut self.expected_terms] {
                if let Slot::Grid { idx, histogram, .. } = slot {
                    histogram[*idx] += 1.0;
                }
            }
        }
    }

    /// Recomputes counts and score from scratch, ignoring all incremental state
    ///
    /// Only used to verify the incremental updates.
    #[cfg(test)]
    fn recalculated(&self) -> (ConfusionCounts, f64) {
        let mut counts = ConfusionCounts::default();
        for (item, observed) in self.observed.iter().enumerate() {
            match (self.state.is_covered(item), *observed) {
                (false, false) => counts.n00 += 1,
                (true, false) => counts.n01 += 1,
                (false, true) => counts.n10 += 1,
                (true, true) => counts.n11 += 1,
            }
        }
        let mut fresh = self.clone();
        fresh.counts = counts;
        (counts, fresh.calculate_score())
    }
}

fn add_weights(slot: &mut Slot, weights: &[f64]) {
    if let Slot::Grid { histogram, .. } = slot {
        for (bin, w) in histogram.iter_mut().zip(weights) {
            *bin += w;
        }
    }
}

impl Score for BinaryScore<'_> {
    fn propose(&mut self, random_bits: u64) {
        let neighborhood = self.neighborhood_size();
        if neighborhood == 0 {
            self.last = None;
            return;
        }
        let previous_score = self.score;
        let terms = self.state.term_count() as u64;
        let exchanges = self.exchange_count();
        let choice = random_bits % neighborhood;

        let mut switched = Switches::new();
        let mut param = None;
        if choice < terms {
            switched.push(self.switch(choice as usize));
        } else if choice < terms + exchanges {
            let pair = choice - terms;
            let inactive_count = self.state.inactive_count() as u64;
            let active = self.state.active_at((pair / inactive_count) as usize);
            let inactive = self.state.inactive_at((pair % inactive_count) as usize);
            switched.push(self.switch(active));
            switched.push(self.switch(inactive));
        } else {
            param = self.propose_param(choice - terms - exchanges);
        }

        self.score = self.calculate_score();
        self.last = Some(Proposal {
            switched,
            param,
            score: previous_score,
        });
    }

    fn undo_proposal(&mut self) {
        let Some(proposal) = self.last.take() else {
            return;
        };
        for switched in proposal.switched.into_iter().rev() {
            self.unswitch(switched);
        }
        if let Some((param, old_idx)) = proposal.param {
            self.slot_mut(param).set_idx(old_idx);
        }
        self.score = proposal.score;
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn neighborhood_size(&self) -> u64 {
        let params: u64 = [&self.alpha, &self.beta, &self.expected_terms]
            .into_iter()
            .filter(|slot| self.is_moved(slot))
            .map(Slot::alternatives)
            .sum();
        self.state.term_count() as u64 + self.exchange_count() + params
    }

    fn active_terms(&self) -> Vec<usize> {
        self.state.active_terms()
    }

    fn record(&mut self) {
        self.state.record_activations();
        self.totals.n00 += self.counts.n00;
        self.totals.n01 += self.counts.n01;
        self.totals.n10 += self.counts.n10;
        self.totals.n11 += self.counts.n11;
        self.totals.active_terms += self.state.active_count() as u64;
        self.record_histograms();
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
        let value = |v: f64| if v.is_nan() { None } else { Some(v) };
        HyperParameters {
            alpha: value(self.alpha()),
            beta: value(self.beta()),
            expected_number_of_terms: value(self.point_value(&self.expected_terms)),
        }
    }

    fn em_statistics(&self) -> Option<EmStatistics> {
        let records = self.state.record().num_records();
        if records == 0 {
            return None;
        }
        let n = f64_from_u64(records);
        Some(EmStatistics {
            n00: f64_from_u64(self.totals.n00) / n,
            n01: f64_from_u64(self.totals.n01) / n,
            n10: f64_from_u64(self.totals.n10) / n,
            n11: f64_from_u64(self.totals.n11) / n,
            active_terms: f64_from_u64(self.totals.active_terms) / n,
        })
    }

    fn param_histograms(&self) -> Vec<ParamHistogram> {
        let records = f64_from_u64(self.state.record().num_records()).max(1.0);
        [
            ("alpha", &self.alpha),
            ("beta", &self.beta),
            ("expected number of terms", &self.expected_terms),
        ]
        .into_iter()
        .filter_map(|(name, slot)| match slot {
            Slot::Grid {
                values, histogram, ..
            } => Some(ParamHistogram {
                name,
                values: values.clone(),
                frequencies: histogram.iter().map(|h| h / records).collect(),
            }),
            Slot::Value(_) => None,
        })
        .inspect(|h| debug!("{}: {:?}", h.name, h.frequencies))
        .collect()
    }
}
