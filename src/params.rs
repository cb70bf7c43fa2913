//! Hyperparameters of the noisy observation model
//!
//! The model has three hyperparameters:
//!
//! - `alpha`, the false-positive rate
//! - `beta`, the false-negative rate
//! - the expected number of active terms, which defines the prior
//!   probability `p = expected / term_count` of a term being active
//!
//! Each of them is either fixed, re-estimated between EM iterations or
//! sampled from a discrete grid of candidate values by the Markov chain.
use crate::{clamp_logged, MgsaError, MgsaResult, PARAM_MAX, PARAM_MIN};

/// Candidate values for a sampled `alpha`
pub const ALPHA_GRID: [f64; 20] = [
    0.000_000_1,
    0.05,
    0.1,
    0.15,
    0.2,
    0.25,
    0.3,
    0.35,
    0.4,
    0.45,
    0.5,
    0.55,
    0.6,
    0.65,
    0.7,
    0.75,
    0.8,
    0.85,
    0.9,
    0.95,
];

/// Candidate values for a sampled `beta`
pub const BETA_GRID: [f64; 20] = ALPHA_GRID;

/// Candidate values for a sampled expected number of terms
pub const EXPECTED_NUMBER_OF_TERMS_GRID: [f64; 20] = [
    1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0,
    18.0, 19.0, 20.0,
];

/// Start value of `alpha` and `beta` for the first EM iteration
pub const EM_START_RATE: f64 = 0.4;

/// Start value of the expected number of terms for the first EM iteration
pub const EM_START_EXPECTED_NUMBER_OF_TERMS: f64 = 1.0;

/// How a hyperparameter is determined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamMode {
    /// The parameter has a fixed value
    Fixed(f64),
    /// The parameter is re-estimated between the outer EM iterations
    Em,
    /// The parameter is part of the sampled state (or integrated out)
    Sampled,
}

/// A hyperparameter setting together with optional bounds
///
/// The bounds only apply to [`ParamMode::Sampled`] and restrict
/// the grid of candidate values.
///
/// # Examples
///
/// ```
/// use mgsa::{DoubleParam, ParamMode};
/// use mgsa::params::ALPHA_GRID;
///
/// let alpha = DoubleParam::sampled().with_max(0.2);
/// assert_eq!(alpha.mode(), ParamMode::Sampled);
/// assert_eq!(alpha.candidates(&ALPHA_GRID).len(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleParam {
    mode: ParamMode,
    min: Option<f64>,
    max: Option<f64>,
}

impl Default for DoubleParam {
    fn default() -> Self {
        Self::sampled()
    }
}

impl DoubleParam {
    /// A parameter with a fixed value
    pub fn fixed(value: f64) -> Self {
        Self {
            mode: ParamMode::Fixed(value),
            min: None,
            max: None,
        }
    }

    /// A parameter that is re-estimated by EM
    pub fn em() -> Self {
        Self {
            mode: ParamMode::Em,
            min: None,
            max: None,
        }
    }

    /// A parameter that is sampled by the Markov chain
    pub fn sampled() -> Self {
        Self {
            mode: ParamMode::Sampled,
            min: None,
            max: None,
        }
    }

    /// Restricts sampled values to `>= min`
    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Restricts sampled values to `<= max`
    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Returns how the parameter is determined
    pub fn mode(&self) -> ParamMode {
        self.mode
    }

    /// Returns `true` for [`ParamMode::Em`]
    pub fn is_em(&self) -> bool {
        self.mode == ParamMode::Em
    }

    /// The lower bound, if any
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    /// The upper bound, if any
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// The values of `grid` that lie within the bounds
    pub fn candidates(&self, grid: &[f64]) -> Vec<f64> {
        grid.iter()
            .copied()
            .filter(|v| self.min.map_or(true, |min| *v >= min))
            .filter(|v| self.max.map_or(true, |max| *v <= max))
            .collect()
    }
}

/// The value of a hyperparameter during one inner chain
#[derive(Debug, Clone, PartialEq)]
pub enum ChainParam {
    /// A single value, either fixed or the current EM estimate
    Value(f64),
    /// A non-empty grid of candidate values
    Grid(Vec<f64>),
}

impl ChainParam {
    /// Returns the point value, `None` for a grid
    pub fn value(&self) -> Option<f64> {
        match self {
            ChainParam::Value(v) => Some(*v),
            ChainParam::Grid(_) => None,
        }
    }

    fn from_param(
        name: &str,
        param: &DoubleParam,
        grid: &[f64],
        em_start: f64,
        clamp: bool,
    ) -> MgsaResult<Self> {
        match param.mode() {
            ParamMode::Fixed(value) if clamp => {
                Ok(ChainParam::Value(clamp_logged(name, value, PARAM_MIN, PARAM_MAX)))
            }
            ParamMode::Fixed(value) if value > 0.0 && value.is_finite() => {
                Ok(ChainParam::Value(value))
            }
            ParamMode::Fixed(value) => Err(MgsaError::InvalidParameter(format!(
                "{name} must be positive, but is {value}"
            ))),
            ParamMode::Em => Ok(ChainParam::Value(em_start)),
            ParamMode::Sampled => {
                let candidates = param.candidates(grid);
                if candidates.is_empty() {
                    Err(MgsaError::InvalidParameter(format!(
                        "no candidate values for {name} within bounds {:?}..{:?}",
                        param.min(),
                        param.max()
                    )))
                } else {
                    Ok(ChainParam::Grid(candidates))
                }
            }
        }
    }
}

/// The hyperparameter setup of one inner chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainParams {
    /// The false-positive rate
    pub alpha: ChainParam,
    /// The false-negative rate
    pub beta: ChainParam,
    /// The expected number of active terms
    pub expected_number_of_terms: ChainParam,
}

impl ChainParams {
    /// The setup of the first chain
    ///
    /// Fixed `alpha` and `beta` are clamped into `(1e-6, 1 - 1e-6)`,
    /// EM parameters start at their default start values.
    ///
    /// # Errors
    ///
    /// Returns [`MgsaError::InvalidParameter`] if the bounds of a sampled
    /// parameter exclude every grid value or a fixed expected number of
    /// terms is not positive.
    pub fn initial(
        alpha: &DoubleParam,
        beta: &DoubleParam,
        expected_number_of_terms: &DoubleParam,
    ) -> MgsaResult<Self> {
        Ok(Self {
            alpha: ChainParam::from_param("alpha", alpha, &ALPHA_GRID, EM_START_RATE, true)?,
            beta: ChainParam::from_param("beta", beta, &BETA_GRID, EM_START_RATE, true)?,
            expected_number_of_terms: ChainParam::from_param(
                "expected number of terms",
                expected_number_of_terms,
                &EXPECTED_NUMBER_OF_TERMS_GRID,
                EM_START_EXPECTED_NUMBER_OF_TERMS,
                false,
            )?,
        })
    }
}

/// Point values of the hyperparameters of a sampled state
///
/// A value is `None` when the parameter is integrated out.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HyperParameters {
    /// The false-positive rate
    pub alpha: Option<f64>,
    /// The false-negative rate
    pub beta: Option<f64>,
    /// The expected number of active terms
    pub expected_number_of_terms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_filter_grid() {
        let param = DoubleParam::sampled().with_min(0.1).with_max(0.3);
        assert_eq!(param.candidates(&ALPHA_GRID), vec![0.1, 0.15, 0.2, 0.25, 0.3]);
        assert_eq!(DoubleParam::sampled().candidates(&ALPHA_GRID).len(), 20);
    }

    #[test]
    fn initial_values() {
        let params = ChainParams::initial(
            &DoubleParam::fixed(0.0),
            &DoubleParam::em(),
            &DoubleParam::sampled().with_max(3.0),
        )
        .unwrap();
        assert_eq!(params.alpha, ChainParam::Value(PARAM_MIN));
        assert_eq!(params.beta, ChainParam::Value(EM_START_RATE));
        assert_eq!(
            params.expected_number_of_terms,
            ChainParam::Grid(vec![1.0, 2.0, 3.0])
        );
        assert_eq!(params.expected_number_of_terms.value(), None);
    }

    #[test]
    fn fixed_rates_are_clamped() {
        let params = ChainParams::initial(
            &DoubleParam::fixed(1.0),
            &DoubleParam::fixed(-3.0),
            &DoubleParam::fixed(2.0),
        )
        .unwrap();
        assert_eq!(params.alpha.value(), Some(PARAM_MAX));
        assert_eq!(params.beta.value(), Some(PARAM_MIN));
        assert_eq!(params.expected_number_of_terms.value(), Some(2.0));
    }

    #[test]
    fn invalid_setups() {
        let empty = DoubleParam::sampled().with_min(0.99);
        assert!(ChainParams::initial(&empty, &DoubleParam::em(), &DoubleParam::em()).is_err());

        let zero_terms = DoubleParam::fixed(0.0);
        assert!(matches!(
            ChainParams::initial(&DoubleParam::em(), &DoubleParam::em(), &zero_terms),
            Err(MgsaError::InvalidParameter(_))
        ));
    }
}
