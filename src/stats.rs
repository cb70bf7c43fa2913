//! The results of an MGSA calculation
//!
//! [`MgsaEnrichment`] holds one [`TermEnrichment`] for every term of the
//! term universe and, unless the study set was empty, the [`Diagnostics`]
//! of the sampler.
//!
//! # Examples
//!
//! ```
//! use mgsa::{Associations, ItemSet, MgsaCalculation, DoubleParam, TermId};
//!
//! let mut associations = Associations::new();
//! for gene in ["a", "b"] {
//!     associations.add_total(gene, TermId::from(7u32));
//! }
//! associations.add_total("c", TermId::from(8u32));
//!
//! let population: ItemSet = ["a", "b", "c", "d"].into_iter().collect();
//! let study: ItemSet = ["a", "b"].into_iter().collect();
//!
//! let mut calculation = MgsaCalculation::default();
//! calculation.set_seed(1).set_mcmc_steps(500).set_burn_in(50);
//! let mut enrichments: Vec<_> = calculation
//!     .calculate_study_set(&associations, &population, &study)
//!     .unwrap()
//!     .into_iter()
//!     .collect();
//!
//! // the results are ordered by term, not by marginal probability
//! enrichments.sort_by(|a, b| b.marginal().total_cmp(&a.marginal()));
//!
//! for term in &enrichments {
//!     println!("{}\t{}\t{}/{}", term.term(), term.marginal(), term.annotated_study(), term.annotated_population());
//! }
//! ```
use crate::annotations::TermEnumerator;
use crate::mapper::IndexMapper;
use crate::mcmc::McmcOutcome;
use crate::params::{ChainParams, HyperParameters};
use crate::score::{ParamHistogram, Score};
use crate::term::TermLabels;
use crate::TermId;

/// The marginal posterior probability of a single term
#[derive(Debug, Clone, PartialEq)]
pub struct TermEnrichment {
    term: TermId,
    annotated_study: usize,
    annotated_population: usize,
    marginal: f64,
}

impl TermEnrichment {
    /// Constructs a new `TermEnrichment`
    pub fn new(
        term: TermId,
        annotated_study: usize,
        annotated_population: usize,
        marginal: f64,
    ) -> Self {
        Self {
            term,
            annotated_study,
            annotated_population,
            marginal,
        }
    }

    /// Returns the ID of the term
    pub fn term(&self) -> TermId {
        self.term
    }

    /// Returns the number of study items annotated to the term
    pub fn annotated_study(&self) -> usize {
        self.annotated_study
    }

    /// Returns the number of population items annotated to the term
    pub fn annotated_population(&self) -> usize {
        self.annotated_population
    }

    /// Returns the fraction of recorded states in which the term was active
    pub fn marginal(&self) -> f64 {
        self.marginal
    }

    /// Returns `1 - marginal`
    ///
    /// This is not a p-value. It only allows sorting the results
    /// like those of a classical enrichment analysis.
    pub fn pvalue(&self) -> f64 {
        1.0 - self.marginal
    }
}

/// What the sampler did to arrive at the marginals
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    /// The highest score of the last chain
    pub best_score: f64,
    /// The active terms of the highest scoring state
    pub best_active_terms: Vec<TermId>,
    /// The hyperparameters of the highest scoring state
    pub best_hyper_parameters: HyperParameters,
    /// The step at which the highest scoring state was reached
    pub step_at_best: usize,
    /// Accepted proposals of the last chain
    pub accepts: u64,
    /// Rejected proposals of the last chain
    pub rejects: u64,
    /// Number of chains, i.e. EM iterations, that ran
    pub chains: usize,
    /// Number of recorded states of the last chain
    pub records: u64,
    /// Posterior distributions of the sampled hyperparameters
    pub histograms: Vec<ParamHistogram>,
    /// Point values of the hyperparameters after the last EM update
    pub final_parameters: HyperParameters,
}

impl Diagnostics {
    /// The best active terms with their names, if `labels` knows them
    pub fn best_terms_labeled(&self, labels: &dyn TermLabels) -> Vec<String> {
        self.best_active_terms
            .iter()
            .map(|term| match labels.label(*term) {
                Some(label) => format!("{term} ({label})"),
                None => term.to_string(),
            })
            .collect()
    }
}

/// The result of an MGSA calculation
#[derive(Debug, Clone, Default)]
pub struct MgsaEnrichment {
    terms: Vec<TermEnrichment>,
    diagnostics: Option<Diagnostics>,
    partial: bool,
}

impl MgsaEnrichment {
    /// A result without any terms, e.g. for an empty study set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collects the records of the last chain
    ///
    /// `universe` maps the dense term indices of the score state,
    /// the enumerators provide the annotation counts.
    pub(crate) fn from_outcome<S: Score>(
        outcome: &McmcOutcome<S>,
        universe: &IndexMapper<TermId>,
        study: &TermEnumerator,
        population: &TermEnumerator,
    ) -> Self {
        let records = outcome.score.records();
        let terms = universe
            .iter()
            .enumerate()
            .map(|(idx, term)| {
                TermEnrichment::new(
                    *term,
                    study.annotated_count(*term),
                    population.annotated_count(*term),
                    records.marginal(idx),
                )
            })
            .collect();

        let diagnostics = outcome.last_chain().map(|chain| Diagnostics {
            best_score: chain.best.score,
            best_active_terms: chain
                .best
                .active_terms
                .iter()
                .filter_map(|idx| universe.get(*idx).copied())
                .collect(),
            best_hyper_parameters: chain.best.hyper_parameters,
            step_at_best: chain.best.step,
            accepts: chain.accepts,
            rejects: chain.rejects,
            chains: outcome.chains.len(),
            records: records.num_records(),
            histograms: outcome.score.param_histograms(),
            final_parameters: point_values(&outcome.params),
        });

        Self {
            terms,
            diagnostics,
            partial: outcome.partial,
        }
    }

    /// Returns the enrichment of `term`, if it is part of the term universe
    pub fn get(&self, term: TermId) -> Option<&TermEnrichment> {
        self.terms.iter().find(|t| t.term == term)
    }

    /// Returns the diagnostics of the sampler, `None` if it never ran
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    /// Returns `true` if the calculation was cancelled before it completed
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Iterates all term enrichments, ordered by term
    pub fn iter(&self) -> std::slice::Iter<'_, TermEnrichment> {
        self.terms.iter()
    }

    /// Returns the number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns `true` if there are no terms
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl<'a> IntoIterator for &'a MgsaEnrichment {
    type Item = &'a TermEnrichment;
    type IntoIter = std::slice::Iter<'a, TermEnrichment>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for MgsaEnrichment {
    type Item = TermEnrichment;
    type IntoIter = std::vec::IntoIter<TermEnrichment>;
    fn into_iter(self) -> Self::IntoIter {
        self.terms.into_iter()
    }
}

fn point_values(params: &ChainParams) -> HyperParameters {
    HyperParameters {
        alpha: params.alpha.value(),
        beta: params.beta.value(),
        expected_number_of_terms: params.expected_number_of_terms.value(),
    }
}
