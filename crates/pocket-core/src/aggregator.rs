// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Statistical Aggregator
// ─────────────────────────────────────────────────────────────────────
//! Multi-seed drift classification at a fixed dt.
//!
//! One run per seed, one tail statistic per run, then the aggregate tail
//! mean is the arithmetic mean of the per-seed tail means. The dead band
//! is `±ε` times the mean tail energy of the completed seeds. Seeds are
//! processed and combined in ascending order, so the result does not
//! depend on the order the seeds were listed in.
//!
//! The [`DriftProbe`] trait is the seam the boundary finder searches
//! over: [`Aggregator`] is the real simulation, [`ExternalProbe`] wraps an
//! arbitrary closure.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use pocket_physics::RunExecutor;
use pocket_types::error::ensure_positive;
use pocket_types::{
    DriftSign, EnsembleConfig, PocketError, PocketResult, TailStatistic, TrialPhase, TrialRecord,
};

use crate::cancel::CancelHandle;

/// Result of one seed at one dt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeedOutcome {
    Completed {
        tail: TailStatistic,
        cap_fraction: f64,
    },
    /// The run hit `NumericDivergence`; excluded from the mean.
    Diverged,
}

/// Combined sign signal at one dt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub dt: f64,
    pub sign: DriftSign,
    pub tail_mean: f64,
    /// Completed seeds, ascending.
    pub seeds: Vec<u64>,
    /// Tail means aligned with `seeds`.
    pub tail_means: Vec<f64>,
    /// Mean tail energy the dead band is scaled by.
    pub energy_scale: f64,
    /// Cap-engagement fractions aligned with `seeds`.
    pub cap_fractions: Vec<f64>,
    pub divergent_seeds: Vec<u64>,
    pub cap_engagement_fraction: f64,
    /// Budget ran out before every seed was run.
    pub degraded: bool,
}

impl Aggregate {
    /// Pure combination step. `runs` may be in any order.
    pub fn from_runs(
        dt: f64,
        mut runs: Vec<(u64, SeedOutcome)>,
        epsilon: f64,
        degraded: bool,
    ) -> Self {
        runs.sort_by_key(|(seed, _)| *seed);

        let mut seeds = Vec::with_capacity(runs.len());
        let mut tail_means = Vec::with_capacity(runs.len());
        let mut scales = Vec::with_capacity(runs.len());
        let mut cap_fractions = Vec::with_capacity(runs.len());
        let mut divergent_seeds = Vec::new();
        for (seed, outcome) in runs {
            match outcome {
                SeedOutcome::Completed { tail, cap_fraction } => {
                    seeds.push(seed);
                    tail_means.push(tail.mean);
                    scales.push(tail.scale);
                    cap_fractions.push(cap_fraction);
                }
                SeedOutcome::Diverged => divergent_seeds.push(seed),
            }
        }

        let (tail_mean, energy_scale, sign) = if tail_means.is_empty() {
            (f64::NAN, 0.0, DriftSign::Inconclusive)
        } else {
            let mean_drift = mean(&tail_means);
            let scale = mean(&scales);
            (mean_drift, scale, DriftSign::classify_relative(mean_drift, scale, epsilon))
        };
        let cap_engagement_fraction = if cap_fractions.is_empty() {
            0.0
        } else {
            mean(&cap_fractions)
        };

        Self {
            dt,
            sign,
            tail_mean,
            seeds,
            tail_means,
            energy_scale,
            cap_fractions,
            divergent_seeds,
            cap_engagement_fraction,
            degraded,
        }
    }

    pub fn completed(&self) -> usize {
        self.seeds.len()
    }

    pub fn into_trial(self, index: usize, phase: TrialPhase) -> TrialRecord {
        TrialRecord {
            index,
            phase,
            dt: self.dt,
            aggregate_sign: self.sign,
            aggregate_tail_mean: self.tail_mean,
            tail_means: self.tail_means,
            seeds: self.seeds,
            divergent_seeds: self.divergent_seeds,
            cap_engagement_fraction: self.cap_engagement_fraction,
            degraded: self.degraded,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Anything that can classify the drift sign at a given dt.
pub trait DriftProbe: Send + Sync {
    /// Evaluate at `dt`. Must return `Err(Cancelled)` when `cancel` is
    /// observed mid-evaluation.
    fn evaluate(&self, dt: f64, cancel: &CancelHandle) -> PocketResult<Aggregate>;
}

/// Seeded multi-run aggregator over the real simulation.
pub struct Aggregator {
    config: EnsembleConfig,
}

impl Aggregator {
    pub fn new(config: EnsembleConfig) -> PocketResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Single seed. Divergence becomes `SeedOutcome::Diverged`; any other
    /// error propagates.
    pub fn run_seed(&self, dt: f64, seed: u64) -> PocketResult<SeedOutcome> {
        let executor = RunExecutor::new(self.config.run_config(dt, seed))?;
        match executor.execute() {
            Ok(outcome) => {
                let tail = TailStatistic::from_trace(
                    &outcome.trace,
                    self.config.tail_fraction,
                    self.config.epsilon,
                )?;
                Ok(SeedOutcome::Completed {
                    tail,
                    cap_fraction: outcome.cap_engagement_fraction(),
                })
            }
            Err(PocketError::NumericDivergence { step, .. }) => {
                log::debug!("dt={dt} seed={seed}: diverged at step {step}, excluded");
                Ok(SeedOutcome::Diverged)
            }
            Err(e) => Err(e),
        }
    }

    /// All seeds at `dt`, honouring the cancel flag and the wall-clock
    /// budget between seeds.
    pub fn aggregate(&self, dt: f64, cancel: &CancelHandle) -> PocketResult<Aggregate> {
        ensure_positive("dt", dt)?;
        let deadline = self
            .config
            .budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        let mut seeds = self.config.seeds.clone();
        seeds.sort_unstable();

        let mut runs = Vec::with_capacity(seeds.len());
        let mut degraded = false;
        for seed in seeds {
            if cancel.is_cancelled() {
                log::info!("dt={dt}: aggregation cancelled after {} seeds", runs.len());
                return Err(PocketError::Cancelled { trials: 0 });
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::warn!(
                    "dt={dt}: wall-clock budget exhausted after {}/{} seeds",
                    runs.len(),
                    self.config.seeds.len()
                );
                degraded = true;
                break;
            }
            runs.push((seed, self.run_seed(dt, seed)?));
        }

        let agg = Aggregate::from_runs(dt, runs, self.config.epsilon, degraded);
        if !agg.divergent_seeds.is_empty() {
            log::warn!(
                "dt={dt}: {} of {} seeds diverged",
                agg.divergent_seeds.len(),
                agg.divergent_seeds.len() + agg.completed()
            );
        }
        Ok(agg)
    }
}

impl DriftProbe for Aggregator {
    fn evaluate(&self, dt: f64, cancel: &CancelHandle) -> PocketResult<Aggregate> {
        self.aggregate(dt, cancel)
    }
}

type TailMeanFn = Box<dyn Fn(f64) -> f64 + Send + Sync>;

/// Probe backed by a closure returning the tail mean at `dt`.
///
/// Reports a single pseudo-seed `0` with unit energy scale, so `epsilon`
/// is absolute. A non-finite value counts as a divergent seed.
pub struct ExternalProbe {
    tail_mean_fn: TailMeanFn,
    epsilon: f64,
}

impl ExternalProbe {
    pub fn new(epsilon: f64, tail_mean_fn: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            tail_mean_fn: Box::new(tail_mean_fn),
            epsilon,
        }
    }
}

impl DriftProbe for ExternalProbe {
    fn evaluate(&self, dt: f64, cancel: &CancelHandle) -> PocketResult<Aggregate> {
        ensure_positive("dt", dt)?;
        if cancel.is_cancelled() {
            return Err(PocketError::Cancelled { trials: 0 });
        }
        let value = (self.tail_mean_fn)(dt);
        let outcome = if value.is_finite() {
            SeedOutcome::Completed {
                tail: TailStatistic {
                    mean: value,
                    scale: 1.0,
                    sign: DriftSign::classify(value, self.epsilon),
                    window: 1,
                },
                cap_fraction: 0.0,
            }
        } else {
            SeedOutcome::Diverged
        };
        Ok(Aggregate::from_runs(dt, vec![(0, outcome)], self.epsilon, false))
    }
}
