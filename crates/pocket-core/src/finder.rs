// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Boundary Finder (bracket + bisect)
// ─────────────────────────────────────────────────────────────────────
//! Locates the step size dt* where the aggregate drift sign flips.
//!
//! The search is a pull-based state machine: every call to
//! [`Search::next`] evaluates exactly one dt, appends it to the trials
//! log and yields the frozen record.
//!
//! 1. **Endpoints**: evaluate `lo` and `hi`. Opposite decisive signs go
//!    straight to bisection.
//! 2. **Scan**: evaluate `scan_budget` interior points; the first pair of
//!    adjacent decisive trials with opposite signs becomes the bracket.
//!    Without a flip the search ends with `NoBracketFound`.
//! 3. **Bisect**: probe inside the bracket and replace the endpoint that
//!    shares the probe's sign. An inconclusive probe leaves the bracket
//!    alone and the next probe moves off-centre (¼, ¾, ⅛, ⅞, …).
//!
//! # Invariants
//!
//! - A `Converged` estimate always has `hi − lo <= tolerance`.
//! - Every decisive bisection trial strictly shrinks the bracket, and the
//!   new bracket is nested in the old one.
//! - A cancelled evaluation is never logged.

use std::sync::Arc;

use pocket_types::{
    BoundaryEstimate, DriftSign, PocketError, PocketResult, ScanSpacing, SearchConfig,
    TerminationReason, TrialPhase, TrialRecord,
};

use crate::aggregator::DriftProbe;
use crate::cancel::CancelHandle;
use crate::trials::TrialLog;

/// Bracket-and-bisect driver over a [`DriftProbe`].
pub struct BoundaryFinder<P: DriftProbe> {
    probe: P,
    config: SearchConfig,
    log: Arc<TrialLog>,
    cancel: CancelHandle,
}

impl<P: DriftProbe> BoundaryFinder<P> {
    pub fn new(probe: P, config: SearchConfig) -> PocketResult<Self> {
        config.validate()?;
        Ok(Self {
            probe,
            config,
            log: Arc::new(TrialLog::new()),
            cancel: CancelHandle::new(),
        })
    }

    /// Append trials to an existing (possibly shared) log.
    pub fn with_trial_log(mut self, log: Arc<TrialLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn trial_log(&self) -> Arc<TrialLog> {
        Arc::clone(&self.log)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Start a new search. Nothing is evaluated until the first `next()`.
    pub fn search(&self) -> Search<'_, P> {
        log::info!(
            "boundary search over [{}, {}], tolerance {}, scan budget {}, max trials {}",
            self.config.lo,
            self.config.hi,
            self.config.tolerance,
            self.config.scan_budget,
            self.config.max_trials
        );
        Search {
            finder: self,
            stage: Stage::Endpoints,
            lo_end: None,
            hi_end: None,
            last_decisive: None,
            bracket: None,
            trials: Vec::new(),
            outcome: None,
            error: None,
        }
    }

    /// Drive a search to termination.
    ///
    /// Non-converged terminations are `Ok` with their reason; use
    /// [`BoundaryEstimate::require_converged`] to turn them into errors.
    pub fn run(&self) -> PocketResult<BoundaryEstimate> {
        self.search().finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Probe {
    dt: f64,
    sign: DriftSign,
}

#[derive(Debug, Clone)]
enum Stage {
    Endpoints,
    Scan { points: Vec<f64>, next: usize },
    Bisect { lo: Probe, hi: Probe, offset: usize },
    Done,
}

/// Position of the `offset`-th bisection probe inside the bracket.
fn probe_fraction(offset: usize) -> f64 {
    if offset == 0 {
        return 0.5;
    }
    let depth = (offset + 1) / 2;
    let f = 0.5f64.powi(depth as i32 + 1);
    if offset % 2 == 1 {
        f
    } else {
        1.0 - f
    }
}

/// Interior points strictly between `lo` and `hi`.
pub fn scan_points(lo: f64, hi: f64, count: usize, spacing: ScanSpacing) -> Vec<f64> {
    let denom = (count + 1) as f64;
    (1..=count)
        .map(|i| {
            let frac = i as f64 / denom;
            match spacing {
                ScanSpacing::Linear => lo + (hi - lo) * frac,
                ScanSpacing::Geometric => lo * (hi / lo).powf(frac),
            }
        })
        .collect()
}

/// One in-progress boundary search.
pub struct Search<'a, P: DriftProbe> {
    finder: &'a BoundaryFinder<P>,
    stage: Stage,
    lo_end: Option<Probe>,
    hi_end: Option<Probe>,
    last_decisive: Option<Probe>,
    bracket: Option<(f64, f64)>,
    trials: Vec<Arc<TrialRecord>>,
    outcome: Option<BoundaryEstimate>,
    error: Option<PocketError>,
}

impl<P: DriftProbe> Search<'_, P> {
    /// Current bracket, once a sign flip has been found.
    pub fn bracket(&self) -> Option<(f64, f64)> {
        self.bracket
    }

    /// Final estimate, once the search has terminated.
    pub fn outcome(&self) -> Option<&BoundaryEstimate> {
        self.outcome.as_ref()
    }

    /// Trials evaluated by this search, in order.
    pub fn trials(&self) -> &[Arc<TrialRecord>] {
        &self.trials
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.error.is_some()
    }

    /// Run the remaining trials and return the estimate.
    pub fn finish(mut self) -> PocketResult<BoundaryEstimate> {
        while self.next().is_some() {}
        if let Some(e) = self.error {
            return Err(e);
        }
        self.outcome.ok_or_else(|| {
            PocketError::InvalidParameter("search ended without an outcome".to_string())
        })
    }

    fn config(&self) -> &SearchConfig {
        &self.finder.config
    }

    /// Next dt to evaluate, or `None` after recording a termination.
    fn plan(&mut self) -> Option<(f64, TrialPhase)> {
        let planned = match &self.stage {
            Stage::Endpoints => match self.lo_end {
                None => Some((self.config().lo, TrialPhase::Endpoint)),
                Some(_) => Some((self.config().hi, TrialPhase::Endpoint)),
            },
            Stage::Scan { points, next } => {
                points.get(*next).map(|&dt| (dt, TrialPhase::Scan))
            }
            Stage::Bisect { lo, hi, offset } => {
                if hi.dt - lo.dt <= self.config().tolerance {
                    None
                } else {
                    Some((lo.dt + probe_fraction(*offset) * (hi.dt - lo.dt), TrialPhase::Bisect))
                }
            }
            Stage::Done => None,
        };
        if planned.is_none() && !self.is_finished() {
            let reason = match self.stage {
                Stage::Bisect { .. } => TerminationReason::Converged,
                _ => TerminationReason::NoBracketFound,
            };
            self.terminate(reason);
        }
        planned
    }

    fn enter_bisect(&mut self, a: Probe, b: Probe) {
        let (lo, hi) = if a.dt <= b.dt { (a, b) } else { (b, a) };
        log::info!(
            "bracket found: [{}, {}] ({} → {})",
            lo.dt,
            hi.dt,
            lo.sign,
            hi.sign
        );
        self.bracket = Some((lo.dt, hi.dt));
        self.stage = Stage::Bisect { lo, hi, offset: 0 };
        if hi.dt - lo.dt <= self.config().tolerance {
            self.terminate(TerminationReason::Converged);
        }
    }

    fn enter_scan(&mut self) {
        let cfg = self.config();
        let points = scan_points(cfg.lo, cfg.hi, cfg.scan_budget, cfg.spacing);
        log::info!("endpoints do not bracket a flip; scanning {} interior points", points.len());
        self.last_decisive = self.lo_end.filter(|p| p.sign.is_decisive());
        if points.is_empty() {
            self.terminate(TerminationReason::NoBracketFound);
        } else {
            self.stage = Stage::Scan { points, next: 0 };
        }
    }

    /// Fold one fresh trial into the state machine.
    fn absorb(&mut self, here: Probe) {
        match &mut self.stage {
            Stage::Endpoints => {
                if self.lo_end.is_none() {
                    self.lo_end = Some(here);
                    return;
                }
                self.hi_end = Some(here);
                let lo_end = self.lo_end;
                match lo_end {
                    Some(lo) if lo.sign.flips_against(here.sign) => self.enter_bisect(lo, here),
                    _ => self.enter_scan(),
                }
            }
            Stage::Scan { points, next } => {
                *next += 1;
                let exhausted = *next >= points.len();
                if here.sign.is_decisive() {
                    if let Some(prev) = self.last_decisive {
                        if prev.sign.flips_against(here.sign) {
                            self.enter_bisect(prev, here);
                            return;
                        }
                    }
                    self.last_decisive = Some(here);
                }
                if exhausted {
                    match (self.last_decisive, self.hi_end) {
                        (Some(prev), Some(hi)) if prev.sign.flips_against(hi.sign) => {
                            self.enter_bisect(prev, hi)
                        }
                        _ => self.terminate(TerminationReason::NoBracketFound),
                    }
                }
            }
            Stage::Bisect { lo, hi, offset } => {
                if !here.sign.is_decisive() {
                    *offset += 1;
                    log::debug!("inconclusive probe at dt={}, bracket unchanged", here.dt);
                    return;
                }
                if here.sign == lo.sign {
                    *lo = here;
                } else {
                    *hi = here;
                }
                *offset = 0;
                let (lo_dt, hi_dt) = (lo.dt, hi.dt);
                self.bracket = Some((lo_dt, hi_dt));
                log::debug!("bracket narrowed to [{lo_dt}, {hi_dt}] (width {})", hi_dt - lo_dt);
                if hi_dt - lo_dt <= self.config().tolerance {
                    self.terminate(TerminationReason::Converged);
                }
            }
            Stage::Done => {}
        }
    }

    fn terminate(&mut self, reason: TerminationReason) {
        let cfg = self.config();
        let (lo, hi) = self.bracket.unwrap_or((cfg.lo, cfg.hi));
        let dt_star = (reason == TerminationReason::Converged).then(|| 0.5 * (lo + hi));
        let record = dt_star.and_then(|target| {
            self.trials
                .iter()
                .min_by(|a, b| (a.dt - target).abs().total_cmp(&(b.dt - target).abs()))
                .map(|nearest| {
                    let mut flat = nearest.flat();
                    flat.dt = target;
                    flat
                })
        });
        match dt_star {
            Some(dt) => log::info!(
                "search converged: dt* = {dt} in [{lo}, {hi}] after {} trials",
                self.trials.len()
            ),
            None => log::warn!(
                "search ended without convergence ({reason}) after {} trials, range [{lo}, {hi}]",
                self.trials.len()
            ),
        }
        self.stage = Stage::Done;
        self.outcome = Some(BoundaryEstimate {
            dt_star,
            lo,
            hi,
            trials: self.trials.len(),
            reason,
            record,
        });
    }
}

impl<P: DriftProbe> Iterator for Search<'_, P> {
    type Item = Arc<TrialRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_finished() {
            return None;
        }
        if self.finder.cancel.is_cancelled() {
            self.terminate(TerminationReason::Cancelled);
            return None;
        }
        if self.trials.len() >= self.config().max_trials {
            self.terminate(TerminationReason::MaxTrialsExceeded);
            return None;
        }
        let (dt, phase) = self.plan()?;

        let aggregate = match self.finder.probe.evaluate(dt, &self.finder.cancel) {
            Ok(aggregate) => aggregate,
            Err(PocketError::Cancelled { .. }) => {
                log::info!("evaluation at dt={dt} cancelled, discarded");
                self.terminate(TerminationReason::Cancelled);
                return None;
            }
            Err(e) => {
                log::error!("evaluation at dt={dt} failed: {e}");
                self.error = Some(e);
                return None;
            }
        };
        let degraded = aggregate.degraded;
        let record = self.finder.log.append(aggregate, phase);
        log::debug!(
            "trial #{} ({:?}) dt={} sign={} mean={:e}",
            record.index,
            phase,
            record.dt,
            record.aggregate_sign,
            record.aggregate_tail_mean
        );
        self.trials.push(Arc::clone(&record));

        self.absorb(Probe { dt: record.dt, sign: record.aggregate_sign });
        if !self.is_finished() {
            if degraded {
                self.terminate(TerminationReason::BudgetExhausted);
            } else if self.trials.len() >= self.config().max_trials {
                self.terminate(TerminationReason::MaxTrialsExceeded);
            }
        }
        Some(record)
    }
}
