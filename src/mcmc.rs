//! The Metropolis-Hastings sampler and the EM iterations around it
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};

use crate::params::{ChainParam, ChainParams, HyperParameters, EXPECTED_NUMBER_OF_TERMS_GRID};
use crate::score::{EmStatistics, Score};
use crate::{clamp_logged, f64_from_u64, f64_from_usize, MgsaError, MgsaResult, EM_MAX, EM_MIN};

mod progress;

pub use progress::{CancelToken, NoProgress, ProgressEvent, ProgressObserver};

/// Settings of the sampler
#[derive(Debug, Clone, PartialEq)]
pub struct McmcConfig {
    /// Total number of steps of every chain, including the burn-in
    pub mcmc_steps: usize,
    /// Number of initial steps that are not recorded
    pub burn_in: usize,
    /// Minimum wall-clock time between two progress reports
    pub update_report_interval: Duration,
    /// Start every chain from a random set of active terms instead of none
    pub random_start: bool,
    /// Number of chains if any hyperparameter is estimated by EM
    pub max_em_iterations: usize,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            mcmc_steps: 1_020_000,
            burn_in: 20_000,
            update_report_interval: Duration::from_millis(1000),
            random_start: false,
            max_em_iterations: 12,
        }
    }
}

/// The hyperparameters that are re-estimated after every chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmTargets {
    /// Re-estimate the false-positive rate
    pub alpha: bool,
    /// Re-estimate the false-negative rate
    pub beta: bool,
    /// Re-estimate the expected number of terms
    pub expected_number_of_terms: bool,
}

impl EmTargets {
    /// Returns `true` if at least one parameter is re-estimated
    pub fn any(&self) -> bool {
        self.alpha || self.beta || self.expected_number_of_terms
    }
}

/// The highest scoring state of a chain
#[derive(Debug, Clone, PartialEq)]
pub struct BestConfiguration {
    /// Dense indices of the active terms
    pub active_terms: Vec<usize>,
    /// Hyperparameters of the state
    pub hyper_parameters: HyperParameters,
    /// The score of the state
    pub score: f64,
    /// The step at which the state was current
    pub step: usize,
}

impl BestConfiguration {
    fn snapshot<S: Score>(score: &S, step: usize) -> Self {
        Self {
            active_terms: score.active_terms(),
            hyper_parameters: score.hyper_parameters(),
            score: score.score(),
            step,
        }
    }
}

/// What happened during one chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSummary {
    /// The outer (EM) iteration of the chain
    pub iteration: usize,
    /// The highest scoring state
    pub best: BestConfiguration,
    /// Number of accepted proposals
    pub accepts: u64,
    /// Number of rejected proposals
    pub rejects: u64,
    /// Number of steps that were executed
    pub steps: usize,
    /// The chain was stopped by a [`CancelToken`]
    pub cancelled: bool,
}

/// The final score state and the history of all chains
#[derive(Debug)]
pub struct McmcOutcome<S> {
    /// The score state of the last chain, holding its records
    pub score: S,
    /// One summary per chain
    pub chains: Vec<ChainSummary>,
    /// The hyperparameter setup after the last EM update
    pub params: ChainParams,
    /// The run was cancelled and the records are incomplete
    pub partial: bool,
}

impl<S> McmcOutcome<S> {
    /// The summary of the last chain
    pub fn last_chain(&self) -> Option<&ChainSummary> {
        self.chains.last()
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Runs Markov chains over the states of a [`Score`]
///
/// Every chain performs `mcmc_steps` Metropolis-Hastings steps. A proposed
/// state is accepted with probability
/// `exp(new_score - old_score) * old_neighborhood / new_neighborhood`.
/// After the burn-in, the current state is recorded at every step,
/// no matter if the proposal was accepted.
///
/// If any hyperparameter is estimated by EM, up to `max_em_iterations`
/// chains run, each one with a fresh score state built from the estimates
/// of the previous chain. Only the records of the last chain are returned.
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Init
///     Init --> BurnIn: new score state
///     BurnIn --> Sampling: step >= burn_in
///     Sampling --> EmReestimate: chain done, EM enabled
///     EmReestimate --> Init: iterations left
///     Sampling --> Done: chain done
///     EmReestimate --> Done: last iteration
///     BurnIn --> Done: cancelled
///     Sampling --> Done: cancelled
///     Done --> [*]
/// ```
pub struct Mcmc<'a> {
    config: &'a McmcConfig,
    observer: &'a dyn ProgressObserver,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Mcmc<'a> {
    /// A sampler that reports to `observer`
    pub fn new(config: &'a McmcConfig, observer: &'a dyn ProgressObserver) -> Self {
        Self {
            config,
            observer,
            cancel: None,
        }
    }

    /// Stops all chains once `cancel` is cancelled
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs all chains
    ///
    /// `make_score` builds the score state of each chain from the current
    /// hyperparameter setup.
    ///
    /// # Errors
    ///
    /// - [`MgsaError::InvalidParameter`] if the score state has no terms
    /// - [`MgsaError::NonFiniteScore`] if a score becomes `NaN` or infinite
    /// - any error returned by `make_score`
    pub fn run<S, R, F>(
        &self,
        mut params: ChainParams,
        em: EmTargets,
        rng: &mut R,
        mut make_score: F,
    ) -> MgsaResult<McmcOutcome<S>>
    where
        S: Score,
        R: Rng + ?Sized,
        F: FnMut(&ChainParams) -> MgsaResult<S>,
    {
        let iterations = if em.any() {
            self.config.max_em_iterations.max(1)
        } else {
            1
        };
        let mut chains = Vec::with_capacity(iterations);
        let mut iteration = 0;

        loop {
            let mut score = make_score(&params)?;
            if score.term_count() == 0 {
                return Err(MgsaError::InvalidParameter(
                    "the score state has no terms".to_string(),
                ));
            }
            if self.config.random_start {
                random_start(&mut score, rng);
            }

            let summary = self.run_chain(iteration, &mut score, rng)?;
            let cancelled = summary.cancelled;
            chains.push(summary);

            if em.any() && !cancelled {
                match score.em_statistics() {
                    Some(stats) => reestimate(&mut params, em, &stats),
                    None => debug!("no statistics to re-estimate parameters"),
                }
            }
            if cancelled || iteration + 1 >= iterations {
                return Ok(McmcOutcome {
                    score,
                    chains,
                    params,
                    partial: cancelled,
                });
            }
            iteration += 1;
        }
    }

    fn run_chain<S: Score, R: Rng + ?Sized>(
        &self,
        iteration: usize,
        score: &mut S,
        rng: &mut R,
    ) -> MgsaResult<ChainSummary> {
        let steps = self.config.mcmc_steps;
        let mut current = score.score();
        if !current.is_finite() {
            return Err(MgsaError::NonFiniteScore {
                iteration,
                step: 0,
                score: current,
            });
        }
        info!(
            "Chain {} starts with {} active terms and score {}",
            iteration,
            score.active_terms().len(),
            current
        );
        self.observer.init(steps);

        let mut best = BestConfiguration::snapshot(score, 0);
        let mut accepts = 0u64;
        let mut rejects = 0u64;
        let mut acceptance_probability = 1.0;
        let started = Instant::now();
        let mut last_report = started;
        let mut executed = steps;
        let mut cancelled = false;

        for step in 0..steps {
            if current > best.score {
                best = BestConfiguration::snapshot(score, step);
            }

            if last_report.elapsed() >= self.config.update_report_interval {
                last_report = Instant::now();
                debug!(
                    "{}% ({}/{}) score={} best={} active terms={} accept/reject={}/{}",
                    step * 100 / steps,
                    step,
                    steps,
                    current,
                    best.score,
                    score.active_terms().len(),
                    accepts,
                    rejects
                );
                self.observer.update(step);
                self.observer.progress(&ProgressEvent {
                    outer_iteration: iteration,
                    step,
                    acceptance_probability,
                    accepts,
                    score: current,
                });
                if self.cancel.map_or(false, CancelToken::is_cancelled) {
                    info!("Chain {} cancelled at step {}", iteration, step);
                    executed = step;
                    cancelled = true;
                    break;
                }
            }

            let old_neighborhood = score.neighborhood_size();
            score.propose(rng.gen());
            let proposed = score.score();
            if !proposed.is_finite() {
                return Err(MgsaError::NonFiniteScore {
                    iteration,
                    step,
                    score: proposed,
                });
            }
            let new_neighborhood = score.neighborhood_size();

            acceptance_probability = (proposed - current).exp() * f64_from_u64(old_neighborhood)
                / f64_from_u64(new_neighborhood);
            if rng.gen::<f64>() >= acceptance_probability {
                score.undo_proposal();
                rejects += 1;
            } else {
                current = proposed;
                accepts += 1;
            }

            if step >= self.config.burn_in {
                score.record();
            }
        }

        if current > best.score {
            best = BestConfiguration::snapshot(score, executed);
        }
        info!(
            "Chain {} done in {:?}: best score {} at step {} with {} active terms, {} accepted, {} rejected",
            iteration,
            started.elapsed(),
            best.score,
            best.step,
            best.active_terms.len(),
            accepts,
            rejects
        );
        Ok(ChainSummary {
            iteration,
            best,
            accepts,
            rejects,
            steps: executed,
            cancelled,
        })
    }
}

/// Activates a random subset of terms
///
/// The size of the subset is drawn from the grid of expected term counts.
fn random_start<S: Score, R: Rng + ?Sized>(score: &mut S, rng: &mut R) {
    let count = EXPECTED_NUMBER_OF_TERMS_GRID[rng.gen_range(0..EXPECTED_NUMBER_OF_TERMS_GRID.len())];
    let p = count / f64_from_usize(score.term_count());
    for term in 0..score.term_count() {
        if rng.gen::<f64>() < p {
            score.switch_state(term);
        }
    }
    debug!(
        "Random start with {} active terms (p = {})",
        score.active_terms().len(),
        p
    );
}

/// `numerator / denominator`, `None` if the denominator is not positive
fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator > 0.0).then(|| numerator / denominator)
}

/// Updates the EM parameters from the averaged statistics of a chain
fn reestimate(params: &mut ChainParams, em: EmTargets, stats: &EmStatistics) {
    if em.alpha {
        if let Some(alpha) = ratio(stats.n10, stats.n00 + stats.n10) {
            params.alpha = ChainParam::Value(clamp_logged("alpha", alpha, EM_MIN, EM_MAX));
        }
    }
    if em.beta {
        if let Some(beta) = ratio(stats.n01, stats.n01 + stats.n11) {
            params.beta = ChainParam::Value(clamp_logged("beta", beta, EM_MIN, EM_MAX));
        }
    }
    if em.expected_number_of_terms {
        params.expected_number_of_terms = ChainParam::Value(clamp_logged(
            "expected number of terms",
            stats.active_terms,
            EM_MIN,
            f64::MAX,
        ));
    }
    info!(
        "EM estimates: alpha={:?} beta={:?} expected number of terms={:?}",
        params.alpha.value(),
        params.beta.value(),
        params.expected_number_of_terms.value()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TermLinks;
    use crate::params::DoubleParam;
    use crate::score::{BinaryScore, ScoreRecord};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every proposal changes the score by `delta`
    struct Stepper {
        value: f64,
        delta: f64,
        proposals: usize,
        nan_at: Option<usize>,
        recorded: usize,
        record: ScoreRecord,
        last: Option<f64>,
    }

    impl Stepper {
        fn new(delta: f64) -> Self {
            Self {
                value: 0.0,
                delta,
                proposals: 0,
                nan_at: None,
                recorded: 0,
                record: ScoreRecord::new(2),
                last: None,
            }
        }
    }

    impl Score for Stepper {
        fn propose(&mut self, _random_bits: u64) {
            self.last = Some(self.value);
            self.proposals += 1;
            self.value = if Some(self.proposals) == self.nan_at {
                f64::NAN
            } else {
                self.value + self.delta
            };
        }

        fn undo_proposal(&mut self) {
            if let Some(value) = self.last.take() {
                self.value = value;
            }
        }

        fn score(&self) -> f64 {
            self.value
        }

        fn neighborhood_size(&self) -> u64 {
            2
        }

        fn active_terms(&self) -> Vec<usize> {
            Vec::new()
        }

        fn record(&mut self) {
            self.recorded += 1;
        }

        fn switch_state(&mut self, _term: usize) {}

        fn term_count(&self) -> usize {
            2
        }

        fn records(&self) -> &ScoreRecord {
            &self.record
        }
    }

    fn config(steps: usize, burn_in: usize) -> McmcConfig {
        McmcConfig {
            mcmc_steps: steps,
            burn_in,
            update_report_interval: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    fn fixed_params() -> ChainParams {
        ChainParams::initial(
            &DoubleParam::fixed(0.1),
            &DoubleParam::fixed(0.2),
            &DoubleParam::fixed(1.0),
        )
        .unwrap()
    }

    #[test]
    fn better_states_are_always_accepted() {
        for delta in [0.0, 0.5] {
            let config = config(500, 100);
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let outcome = Mcmc::new(&config, &NoProgress)
                .run(fixed_params(), EmTargets::default(), &mut rng, |_| {
                    Ok(Stepper::new(delta))
                })
                .unwrap();
            let chain = outcome.last_chain().unwrap();
            assert_eq!(chain.accepts, 500);
            assert_eq!(chain.rejects, 0);
            assert_eq!(outcome.score.recorded, 400);
            assert!(!outcome.partial);
        }
    }

    #[test]
    fn worse_states_are_mostly_rejected() {
        let config = config(1000, 0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = Mcmc::new(&config, &NoProgress)
            .run(fixed_params(), EmTargets::default(), &mut rng, |_| {
                Ok(Stepper::new(-20.0))
            })
            .unwrap();
        let chain = outcome.last_chain().unwrap();
        assert_eq!(chain.accepts + chain.rejects, 1000);
        assert!(chain.rejects > 990);
        assert_eq!(chain.best.step, 0);
        assert_eq!(outcome.score.recorded, 1000);
    }

    #[test]
    fn non_finite_score_aborts() {
        let config = config(100, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = Mcmc::new(&config, &NoProgress).run(
            fixed_params(),
            EmTargets::default(),
            &mut rng,
            |_| {
                let mut score = Stepper::new(0.1);
                score.nan_at = Some(3);
                Ok(score)
            },
        );
        assert!(matches!(
            result,
            Err(MgsaError::NonFiniteScore {
                iteration: 0,
                step: 2,
                ..
            })
        ));
    }

    #[test]
    fn cancelled_chain_is_partial() {
        let mut config = config(100, 10);
        config.update_report_interval = Duration::ZERO;
        let token = CancelToken::new();
        token.cancel();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = Mcmc::new(&config, &NoProgress)
            .with_cancel_token(&token)
            .run(
                fixed_params(),
                EmTargets {
                    alpha: true,
                    ..Default::default()
                },
                &mut rng,
                |_| Ok(Stepper::new(0.1)),
            )
            .unwrap();
        assert!(outcome.partial);
        assert_eq!(outcome.chains.len(), 1);
        assert_eq!(outcome.chains[0].steps, 0);
        assert_eq!(outcome.score.recorded, 0);
    }

    #[derive(Default)]
    struct Counter {
        inits: AtomicUsize,
        updates: AtomicUsize,
    }

    impl ProgressObserver for Counter {
        fn init(&self, _total_steps: usize) {
            self.inits.fetch_add(1, Ordering::Relaxed);
        }

        fn update(&self, _step: usize) {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn zero_interval_reports_every_step() {
        let mut config = config(50, 0);
        config.update_report_interval = Duration::ZERO;
        let counter = Counter::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        Mcmc::new(&config, &counter)
            .run(fixed_params(), EmTargets::default(), &mut rng, |_| {
                Ok(Stepper::new(0.0))
            })
            .unwrap();
        assert_eq!(counter.inits.load(Ordering::Relaxed), 1);
        assert_eq!(counter.updates.load(Ordering::Relaxed), 50);

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        Mcmc::new(&config, &tx)
            .run(fixed_params(), EmTargets::default(), &mut rng, |_| {
                Ok(Stepper::new(1.0))
            })
            .unwrap();
        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 50);
        assert_eq!(events[0].step, 0);
        assert_eq!(events[49].step, 49);
        assert_eq!(events[49].accepts, 49);
    }

    fn links() -> TermLinks {
        TermLinks::new(
            vec![
                vec![0, 1, 2],
                vec![3, 4, 5, 6],
                vec![1, 2, 7],
                vec![8, 9],
                vec![0, 3, 8],
            ],
            12,
        )
    }

    #[test]
    fn same_seed_same_chain() {
        let links = links();
        let mut config = config(3000, 300);
        config.random_start = true;
        let params = ChainParams::initial(
            &DoubleParam::sampled(),
            &DoubleParam::sampled(),
            &DoubleParam::fixed(1.0),
        )
        .unwrap();
        let run = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            Mcmc::new(&config, &NoProgress)
                .run(params.clone(), EmTargets::default(), &mut rng, |p| {
                    Ok(BinaryScore::new(&links, &[0, 1, 2, 10], p))
                })
                .unwrap()
        };
        let first = run(5);
        let second = run(5);
        assert_eq!(first.chains, second.chains);
        assert_eq!(first.score.records(), second.score.records());
        assert_eq!(first.score.records().num_records(), 2700);
    }

    #[test]
    fn em_updates_parameters() {
        let links = links();
        let mut config = config(2000, 200);
        config.max_em_iterations = 3;
        let params = ChainParams::initial(
            &DoubleParam::em(),
            &DoubleParam::fixed(0.1),
            &DoubleParam::em(),
        )
        .unwrap();
        let mut built = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let outcome = Mcmc::new(&config, &NoProgress)
            .run(
                params,
                EmTargets {
                    alpha: true,
                    beta: false,
                    expected_number_of_terms: true,
                },
                &mut rng,
                |p| {
                    built.push(p.clone());
                    Ok(BinaryScore::new(&links, &[0, 1, 2, 10], p))
                },
            )
            .unwrap();
        assert_eq!(outcome.chains.len(), 3);
        assert_eq!(built.len(), 3);
        assert_eq!(built[0].alpha, ChainParam::Value(0.4));
        assert_ne!(built[1].alpha, built[0].alpha);
        assert_eq!(built[2].beta, ChainParam::Value(0.1));

        let alpha = outcome.params.alpha.value().unwrap();
        assert!((EM_MIN..=EM_MAX).contains(&alpha));
        assert!(outcome.params.expected_number_of_terms.value().unwrap() >= EM_MIN);
    }

    #[test]
    fn no_em_runs_once() {
        let links = links();
        let config = config(100, 10);
        let mut chains = 0;
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        Mcmc::new(&config, &NoProgress)
            .run(fixed_params(), EmTargets::default(), &mut rng, |p| {
                chains += 1;
                Ok(BinaryScore::new(&links, &[0], p))
            })
            .unwrap();
        assert_eq!(chains, 1);
    }

    #[test]
    fn empty_score_state_is_invalid() {
        let links = TermLinks::new(Vec::new(), 3);
        let config = config(100, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let result = Mcmc::new(&config, &NoProgress).run(
            fixed_params(),
            EmTargets::default(),
            &mut rng,
            |p| Ok(BinaryScore::new(&links, &[0], p)),
        );
        assert!(matches!(result, Err(MgsaError::InvalidParameter(_))));
    }

    #[test]
    fn em_estimates() {
        let mut params = fixed_params();
        let stats = EmStatistics {
            n00: 6.0,
            n01: 1.0,
            n10: 2.0,
            n11: 3.0,
            active_terms: 0.0,
        };
        reestimate(
            &mut params,
            EmTargets {
                alpha: true,
                beta: true,
                expected_number_of_terms: true,
            },
            &stats,
        );
        assert_eq!(params.alpha, ChainParam::Value(0.25));
        assert_eq!(params.beta, ChainParam::Value(0.25));
        assert_eq!(params.expected_number_of_terms, ChainParam::Value(EM_MIN));
    }
}
