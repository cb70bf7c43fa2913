//! Model-based gene set analysis (MGSA)
//!
//! `mgsa` infers which terms of an ontology best explain why a set of
//! genes (the study set) stands out from its background (the population).
//! Instead of testing every term on its own, it samples combinations of
//! *active* terms with a Markov chain Monte Carlo (MCMC) sampler under a
//! noisy observation model:
//!
//! - every gene annotated to at least one active term is *on*
//! - genes that are on show up in the study set, except with the false-negative rate `beta`
//! - genes that are off show up in the study set with the false-positive rate `alpha`
//!
//! The marginal posterior probability of each term, i.e. the fraction of
//! sampled states in which the term was active, is the result of the analysis.
//!
//! # Examples
//!
//! ```
//! use mgsa::{Associations, ItemSet, MgsaCalculation, DoubleParam, TermId};
//!
//! let mut associations = Associations::new();
//! for gene in ["g1", "g2", "g3"] {
//!     associations.add_total(gene, TermId::from(1u32));
//! }
//! for gene in ["g4", "g5", "g6", "g7"] {
//!     associations.add_total(gene, TermId::from(2u32));
//! }
//!
//! let population: ItemSet = (1..=10).map(|i| format!("g{i}")).collect();
//! let study: ItemSet = ["g1", "g2", "g3"].into_iter().collect();
//!
//! let mut calculation = MgsaCalculation::default();
//! calculation
//!     .set_seed(42)
//!     .set_alpha(DoubleParam::fixed(0.1))
//!     .set_beta(DoubleParam::fixed(0.1))
//!     .set_expected_number_of_terms(DoubleParam::fixed(1.0))
//!     .set_take_population_as_reference(true)
//!     .set_mcmc_steps(2000)
//!     .set_burn_in(200);
//!
//! let result = calculation
//!     .calculate_study_set(&associations, &population, &study)
//!     .unwrap();
//!
//! let t1 = result.get(TermId::from(1u32)).unwrap();
//! let t2 = result.get(TermId::from(2u32)).unwrap();
//! assert!(t1.marginal() > t2.marginal());
//! ```
#![warn(missing_docs)]
use std::num::ParseIntError;
use thiserror::Error;

pub mod annotations;
pub mod calculation;
pub mod graph;
pub mod mapper;
pub mod mcmc;
pub mod params;
pub mod score;
pub mod simulate;
pub mod stats;
pub mod term;

pub use annotations::{Associations, ItemSet, TermEnumerator};
pub use calculation::MgsaCalculation;
pub use graph::TermLinks;
pub use mapper::IndexMapper;
pub use params::{DoubleParam, ParamMode};
pub use stats::{MgsaEnrichment, TermEnrichment};
pub use term::{ItemId, TermId, TermLabels};

/// Lower clamp for explicitly set `alpha` and `beta` values
const PARAM_MIN: f64 = 0.000_001;
/// Upper clamp for explicitly set `alpha` and `beta` values
const PARAM_MAX: f64 = 0.999_999;
/// Lower clamp for values re-estimated between EM iterations
const EM_MIN: f64 = 0.000_000_1;
/// Upper clamp for `alpha` and `beta` re-estimated between EM iterations
const EM_MAX: f64 = 0.999_999_9;

/// Errors raised while setting up or running an MGSA calculation
#[derive(Error, Debug)]
pub enum MgsaError {
    /// A valued calculation requires study set and population set to be identical
    #[error("for a valued calculation, study set and population set must be identical")]
    StudyPopulationMismatch,
    /// The score of a proposed state is `NaN` or infinite
    #[error("score became non-finite ({score}) in iteration {iteration} at step {step}")]
    NonFiniteScore {
        /// The outer (EM) iteration
        iteration: usize,
        /// The step of the inner chain
        step: usize,
        /// The offending score
        score: f64,
    },
    /// The configuration cannot be used for a calculation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The requested term or item does not exist
    #[error("term or item does not exist")]
    DoesNotExist,
    /// A term identifier could not be parsed
    #[error("unable to parse Integer")]
    ParseIntError,
}

impl From<ParseIntError> for MgsaError {
    fn from(_: ParseIntError) -> Self {
        MgsaError::ParseIntError
    }
}

/// Shortcut for `Result<T, MgsaError>`
pub type MgsaResult<T> = Result<T, MgsaError>;

/// Clamps `value` into the interval `[min, max]` and logs if it had to be corrected
fn clamp_logged(name: &str, value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        tracing::debug!("{} of {} clamped to {}", name, value, min);
        min
    } else if value > max {
        tracing::debug!("{} of {} clamped to {}", name, value, max);
        max
    } else {
        value
    }
}

/// Converts counts to `f64` for averaging
///
/// Counts in this crate are bounded by the number of MCMC steps times
/// the number of items, which is far below 2^53.
#[allow(clippy::cast_precision_loss)]
fn f64_from_u64(n: u64) -> f64 {
    n as f64
}

/// Converts lengths and indices to `f64`
#[allow(clippy::cast_precision_loss)]
fn f64_from_usize(n: usize) -> f64 {
    n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping() {
        assert!((clamp_logged("alpha", 0.0, PARAM_MIN, PARAM_MAX) - PARAM_MIN).abs() < f64::EPSILON);
        assert!((clamp_logged("alpha", 1.0, PARAM_MIN, PARAM_MAX) - PARAM_MAX).abs() < f64::EPSILON);
        assert!((clamp_logged("alpha", 0.3, PARAM_MIN, PARAM_MAX) - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn error_messages() {
        let err = MgsaError::NonFiniteScore {
            iteration: 1,
            step: 12,
            score: f64::NAN,
        };
        assert_eq!(
            err.to_string(),
            "score became non-finite (NaN) in iteration 1 at step 12"
        );
        let err: MgsaError = "x".parse::<u32>().unwrap_err().into();
        assert!(matches!(err, MgsaError::ParseIntError));
    }
}
