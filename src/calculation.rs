//! Configuration and entry point of an MGSA calculation
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::annotations::{Associations, ItemSet};
use crate::graph::TermLinks;
use crate::mapper::IndexMapper;
use crate::mcmc::{CancelToken, EmTargets, Mcmc, McmcConfig, NoProgress, ProgressObserver};
use crate::params::{ChainParams, DoubleParam, ParamMode, EM_START_EXPECTED_NUMBER_OF_TERMS};
use crate::score::{BinaryScore, ScoreKind, ValuedModel, ValuedScore};
use crate::stats::MgsaEnrichment;
use crate::term::{NoLabels, TermLabels};
use crate::{MgsaError, MgsaResult};

/// Optional collaborators of a running calculation
///
/// # Examples
///
/// ```
/// use mgsa::calculation::CalculationHooks;
/// use mgsa::mcmc::{CancelToken, ProgressEvent};
///
/// let token = CancelToken::new();
/// let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
/// let hooks = CalculationHooks::default()
///     .with_observer(&tx)
///     .with_cancel_token(&token);
/// # drop(rx);
/// ```
#[derive(Clone, Copy)]
pub struct CalculationHooks<'a> {
    observer: &'a dyn ProgressObserver,
    cancel: Option<&'a CancelToken>,
    labels: &'a dyn TermLabels,
}

impl Default for CalculationHooks<'_> {
    fn default() -> Self {
        Self {
            observer: &NoProgress,
            cancel: None,
            labels: &NoLabels,
        }
    }
}

impl<'a> CalculationHooks<'a> {
    /// Reports progress to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Stops the calculation once `cancel` is cancelled
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Uses `labels` to log the names of the best terms
    #[must_use]
    pub fn with_labels(mut self, labels: &'a dyn TermLabels) -> Self {
        self.labels = labels;
        self
    }
}

/// The configuration of an MGSA calculation
///
/// All setters return `&mut Self` and can be chained.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mgsa::{DoubleParam, MgsaCalculation};
///
/// let mut calculation = MgsaCalculation::default();
/// calculation
///     .set_alpha(DoubleParam::em())
///     .set_beta(DoubleParam::sampled().with_max(0.5))
///     .set_mcmc_steps(100_000)
///     .set_burn_in(10_000)
///     .set_update_report_interval(Duration::from_millis(250));
/// assert_eq!(calculation.mcmc_steps(), 100_000);
/// ```
#[derive(Debug, Clone)]
pub struct MgsaCalculation {
    seed: u64,
    alpha: DoubleParam,
    beta: DoubleParam,
    expected_number_of_terms: DoubleParam,
    use_prior: bool,
    integrate_params: bool,
    take_population_as_reference: bool,
    exchange_moves: bool,
    mcmc: McmcConfig,
    valued_model: ValuedModel,
}

impl Default for MgsaCalculation {
    fn default() -> Self {
        Self {
            seed: 0,
            alpha: DoubleParam::sampled(),
            beta: DoubleParam::sampled(),
            expected_number_of_terms: DoubleParam::sampled(),
            use_prior: true,
            integrate_params: false,
            take_population_as_reference: false,
            exchange_moves: false,
            mcmc: McmcConfig::default(),
            valued_model: ValuedModel::default(),
        }
    }
}

impl MgsaCalculation {
    /// Seeds the random number generator
    ///
    /// `0` (the default) uses a random seed, which is logged.
    pub fn set_seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    /// The false-positive rate (default: sampled)
    pub fn set_alpha(&mut self, alpha: DoubleParam) -> &mut Self {
        self.alpha = alpha;
        self
    }

    /// The false-negative rate (default: sampled)
    pub fn set_beta(&mut self, beta: DoubleParam) -> &mut Self {
        self.beta = beta;
        self
    }

    /// The expected number of active terms (default: sampled)
    pub fn set_expected_number_of_terms(&mut self, expected: DoubleParam) -> &mut Self {
        self.expected_number_of_terms = expected;
        self
    }

    /// Include the prior on the number of active terms (default `true`)
    pub fn set_use_prior(&mut self, use_prior: bool) -> &mut Self {
        self.use_prior = use_prior;
        self
    }

    /// Integrate sampled hyperparameters out instead of sampling them (default `false`)
    pub fn set_integrate_params(&mut self, integrate_params: bool) -> &mut Self {
        self.integrate_params = integrate_params;
        self
    }

    /// Use all terms of the population instead of only those of the study set (default `false`)
    pub fn set_take_population_as_reference(&mut self, take: bool) -> &mut Self {
        self.take_population_as_reference = take;
        self
    }

    /// Also propose exchanging an active with an inactive term (default `false`)
    pub fn set_exchange_moves(&mut self, exchange_moves: bool) -> &mut Self {
        self.exchange_moves = exchange_moves;
        self
    }

    /// Total steps of every chain, including the burn-in (default `1_020_000`)
    pub fn set_mcmc_steps(&mut self, steps: usize) -> &mut Self {
        self.mcmc.mcmc_steps = steps;
        self
    }

    /// Steps that are not recorded (default `20_000`)
    pub fn set_burn_in(&mut self, burn_in: usize) -> &mut Self {
        self.mcmc.burn_in = burn_in;
        self
    }

    /// Minimum time between two progress reports (default one second)
    pub fn set_update_report_interval(&mut self, interval: Duration) -> &mut Self {
        self.mcmc.update_report_interval = interval;
        self
    }

    /// Start from a random set of active terms (default `false`)
    pub fn set_random_start(&mut self, random_start: bool) -> &mut Self {
        self.mcmc.random_start = random_start;
        self
    }

    /// Number of EM iterations if any parameter is estimated by EM (default `12`)
    pub fn set_max_em_iterations(&mut self, iterations: usize) -> &mut Self {
        self.mcmc.max_em_iterations = iterations;
        self
    }

    /// The model for valued study sets
    pub fn set_valued_model(&mut self, model: ValuedModel) -> &mut Self {
        self.valued_model = model;
        self
    }

    /// Returns the configured seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the total steps of every chain
    pub fn mcmc_steps(&self) -> usize {
        self.mcmc.mcmc_steps
    }

    /// Returns the number of burn-in steps
    pub fn burn_in(&self) -> usize {
        self.mcmc.burn_in
    }

    /// Returns the sampler settings
    pub fn mcmc_config(&self) -> &McmcConfig {
        &self.mcmc
    }

    /// Calculates the marginal probabilities of all terms
    ///
    /// # Errors
    ///
    /// - [`MgsaError::StudyPopulationMismatch`] if the study set is valued but
    ///   not identical to the population
    /// - [`MgsaError::InvalidParameter`] for an unusable configuration
    /// - [`MgsaError::NonFiniteScore`] if the sampler hits a non-finite score
    pub fn calculate_study_set(
        &self,
        associations: &Associations,
        population: &ItemSet,
        study: &ItemSet,
    ) -> MgsaResult<MgsaEnrichment> {
        self.calculate_with_hooks(associations, population, study, CalculationHooks::default())
    }

    /// Same as [`MgsaCalculation::calculate_study_set`], with progress reports,
    /// cancellation and term names
    ///
    /// # Errors
    ///
    /// See [`MgsaCalculation::calculate_study_set`]
    pub fn calculate_with_hooks(
        &self,
        associations: &Associations,
        population: &ItemSet,
        study: &ItemSet,
        hooks: CalculationHooks<'_>,
    ) -> MgsaResult<MgsaEnrichment> {
        if study.is_empty() {
            info!("Empty study set, nothing to calculate");
            return Ok(MgsaEnrichment::empty());
        }
        let seed = if self.seed == 0 {
            let seed = rand::thread_rng().gen();
            info!("Using random seed {}", seed);
            seed
        } else {
            self.seed
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.calculate_with_rng(associations, population, study, hooks, &mut rng)
    }

    /// Same as [`MgsaCalculation::calculate_with_hooks`], drawing all random
    /// numbers from `rng` instead of a seeded generator
    ///
    /// # Errors
    ///
    /// See [`MgsaCalculation::calculate_study_set`]
    pub fn calculate_with_rng<R: Rng + ?Sized>(
        &self,
        associations: &Associations,
        population: &ItemSet,
        study: &ItemSet,
        hooks: CalculationHooks<'_>,
        rng: &mut R,
    ) -> MgsaResult<MgsaEnrichment> {
        if study.is_empty() {
            info!("Empty study set, nothing to calculate");
            return Ok(MgsaEnrichment::empty());
        }
        self.validate()?;

        let valued = study.is_valued();
        if valued && !identical(study, population) {
            return Err(MgsaError::StudyPopulationMismatch);
        }

        let population_terms = associations.enumerate(population);
        let study_terms = associations.enumerate(study);
        let universe = if self.take_population_as_reference {
            IndexMapper::create(population_terms.terms())
        } else {
            IndexMapper::create(study_terms.terms())
        };
        if universe.is_empty() {
            info!("No annotated terms, nothing to calculate");
            return Ok(MgsaEnrichment::empty());
        }
        let items = IndexMapper::create(population_terms.items().iter().cloned());
        let links = TermLinks::from_enumerator(&population_terms, &universe, &items);
        info!(
            "{} terms, {} population items, {} study items",
            links.term_count(),
            links.item_count(),
            study_terms.items().len()
        );

        let params = ChainParams::initial(&self.alpha, &self.beta, &self.expected_number_of_terms)?;
        let em = EmTargets {
            alpha: self.alpha.is_em(),
            beta: self.beta.is_em(),
            expected_number_of_terms: self.expected_number_of_terms.is_em(),
        };
        let mut mcmc = Mcmc::new(&self.mcmc, hooks.observer);
        if let Some(cancel) = hooks.cancel {
            mcmc = mcmc.with_cancel_token(cancel);
        }

        let result = if valued {
            let values = items
                .iter()
                .map(|item| study.value(item).ok_or(MgsaError::DoesNotExist))
                .collect::<MgsaResult<Vec<f64>>>()?;
            if em.any() {
                warn!("EM is not available for valued study sets, running a single chain");
            }
            if self.expected_number_of_terms.mode() == ParamMode::Sampled {
                warn!(
                    "the expected number of terms is not sampled for valued study sets, using {}",
                    EM_START_EXPECTED_NUMBER_OF_TERMS
                );
            }
            let outcome = mcmc.run(params, EmTargets::default(), rng, |p| {
                hooks.observer.score_state_created(ScoreKind::Valued);
                let expected = p
                    .expected_number_of_terms
                    .value()
                    .unwrap_or(EM_START_EXPECTED_NUMBER_OF_TERMS);
                let mut score = ValuedScore::new(&links, &values, &self.valued_model, expected)?;
                score.set_use_prior(self.use_prior);
                score.set_exchange_moves(self.exchange_moves);
                Ok(score)
            })?;
            MgsaEnrichment::from_outcome(&outcome, &universe, &study_terms, &population_terms)
        } else {
            let observed = items.dense(study.iter());
            let outcome = mcmc.run(params, em, rng, |p| {
                hooks.observer.score_state_created(ScoreKind::Binary);
                let mut score = BinaryScore::new(&links, &observed, p);
                score.set_use_prior(self.use_prior);
                score.set_integrate_params(self.integrate_params);
                score.set_exchange_moves(self.exchange_moves);
                Ok(score)
            })?;
            MgsaEnrichment::from_outcome(&outcome, &universe, &study_terms, &population_terms)
        };

        if let Some(diagnostics) = result.diagnostics() {
            info!(
                "Best configuration (score {}): {}",
                diagnostics.best_score,
                diagnostics.best_terms_labeled(hooks.labels).join(", ")
            );
        }
        Ok(result)
    }

    fn validate(&self) -> MgsaResult<()> {
        if self.mcmc.mcmc_steps == 0 {
            return Err(MgsaError::InvalidParameter(
                "at least one MCMC step is required".to_string(),
            ));
        }
        if self.mcmc.burn_in >= self.mcmc.mcmc_steps {
            return Err(MgsaError::InvalidParameter(format!(
                "burn-in of {} steps leaves nothing to record from {} steps",
                self.mcmc.burn_in, self.mcmc.mcmc_steps
            )));
        }
        Ok(())
    }
}

/// Returns `true` if both sets contain the same items
fn identical(study: &ItemSet, population: &ItemSet) -> bool {
    study.len() == population.len() && population.iter().all(|item| study.contains(item))
}
