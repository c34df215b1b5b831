// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Trace, Statistic and Trial Records
// ─────────────────────────────────────────────────────────────────────

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PocketError, PocketResult};

/// Sign of the long-run energy drift at one dt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSign {
    /// Tail mean ΔH above the dead band.
    AntiDissipative,
    /// Tail mean ΔH below the dead band.
    Dissipative,
    /// Within the dead band, or no usable seeds.
    Inconclusive,
}

impl DriftSign {
    /// Classify a tail mean against an absolute dead band `±epsilon`.
    ///
    /// Non-finite values are inconclusive.
    pub fn classify(value: f64, epsilon: f64) -> Self {
        if !value.is_finite() {
            log::warn!("classify: non-finite tail mean {value}, treating as inconclusive");
            return Self::Inconclusive;
        }
        if value > epsilon {
            Self::AntiDissipative
        } else if value < -epsilon {
            Self::Dissipative
        } else {
            Self::Inconclusive
        }
    }

    /// Dead band `±epsilon·scale`, with `scale` the energy the drift is
    /// measured against.
    pub fn classify_relative(value: f64, scale: f64, epsilon: f64) -> Self {
        Self::classify(value, epsilon * scale.abs())
    }

    pub fn is_decisive(self) -> bool {
        self != Self::Inconclusive
    }

    /// True when both signs are decisive and opposite.
    pub fn flips_against(self, other: Self) -> bool {
        self.is_decisive() && other.is_decisive() && self != other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AntiDissipative => "anti_dissipative",
            Self::Dissipative => "dissipative",
            Self::Inconclusive => "inconclusive",
        }
    }
}

impl fmt::Display for DriftSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample of an energy trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub step: usize,
    pub t: f64,
    /// Hamiltonian `H(t)`.
    pub h: f64,
    /// Energy residual relative to the baseline: `H(t) − H0` minus the
    /// external work done since the baseline step.
    pub delta_h: f64,
}

/// Ordered energy drift samples of one run, step 0 first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyTrace {
    /// Hamiltonian at the baseline step.
    pub h0: f64,
    pub baseline_step: usize,
    pub points: Vec<TracePoint>,
}

impl EnergyTrace {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TracePoint> {
        self.points.iter()
    }

    /// Largest `|ΔH|` across the whole trace.
    pub fn max_abs_drift(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.delta_h.abs())
            .fold(0.0, f64::max)
    }

    /// Non-empty suffix covering `tail_fraction` of the trace.
    pub fn tail(&self, tail_fraction: f64) -> &[TracePoint] {
        let n = tail_window_len(self.points.len(), tail_fraction);
        &self.points[self.points.len() - n..]
    }
}

impl<'a> IntoIterator for &'a EnergyTrace {
    type Item = &'a TracePoint;
    type IntoIter = std::slice::Iter<'a, TracePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Number of samples in the tail window: `ceil(len · fraction)` clamped to
/// `[1, len]`. Zero only for an empty trace.
pub fn tail_window_len(len: usize, tail_fraction: f64) -> usize {
    if len == 0 {
        return 0;
    }
    let raw = (len as f64 * tail_fraction).ceil();
    if raw.is_nan() || raw < 1.0 {
        1
    } else {
        (raw as usize).min(len)
    }
}

/// Mean ΔH over the tail window of one run, plus its classification.
///
/// The dead band is `±ε·scale`, where `scale` is the mean `H` over the
/// same window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailStatistic {
    pub mean: f64,
    /// Mean Hamiltonian over the window.
    pub scale: f64,
    pub sign: DriftSign,
    /// Samples averaged.
    pub window: usize,
}

impl TailStatistic {
    pub fn from_trace(trace: &EnergyTrace, tail_fraction: f64, epsilon: f64) -> PocketResult<Self> {
        if trace.is_empty() {
            return Err(PocketError::InvalidParameter(
                "cannot compute tail statistic of an empty trace".to_string(),
            ));
        }
        if !(tail_fraction > 0.0 && tail_fraction <= 1.0) {
            return Err(PocketError::InvalidParameter(format!(
                "tail_fraction must be in (0, 1], got {tail_fraction}"
            )));
        }
        let tail = trace.tail(tail_fraction);
        let n = tail.len() as f64;
        let mean = tail.iter().map(|p| p.delta_h).sum::<f64>() / n;
        let scale = tail.iter().map(|p| p.h.abs()).sum::<f64>() / n;
        Ok(Self {
            mean,
            scale,
            sign: DriftSign::classify_relative(mean, scale, epsilon),
            window: tail.len(),
        })
    }
}

/// Which stage of the boundary search produced a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    Endpoint,
    Scan,
    Bisect,
    /// Standalone evaluation outside a search (classify, sweeps).
    Probe,
}

/// One evaluated dt. Immutable once appended to a trials log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Position in the trials log.
    pub index: usize,
    pub phase: TrialPhase,
    pub dt: f64,
    pub aggregate_sign: DriftSign,
    pub aggregate_tail_mean: f64,
    /// Per-seed tail means, aligned with `seeds`.
    pub tail_means: Vec<f64>,
    /// Seeds that completed without diverging, ascending.
    pub seeds: Vec<u64>,
    pub divergent_seeds: Vec<u64>,
    /// Mean over completed seeds of the fraction of cap-flagged steps.
    pub cap_engagement_fraction: f64,
    /// Wall-clock budget ran out before every seed completed.
    pub degraded: bool,
}

impl TrialRecord {
    pub fn flat(&self) -> FlatRecord {
        FlatRecord::from(self)
    }
}

/// Persisted exchange shape shared by trials and boundary estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub dt: f64,
    pub aggregate_sign: DriftSign,
    pub tail_means: Vec<f64>,
    pub cap_engagement_fraction: f64,
    pub seeds: Vec<u64>,
}

impl From<&TrialRecord> for FlatRecord {
    fn from(trial: &TrialRecord) -> Self {
        Self {
            dt: trial.dt,
            aggregate_sign: trial.aggregate_sign,
            tail_means: trial.tail_means.clone(),
            cap_engagement_fraction: trial.cap_engagement_fraction,
            seeds: trial.seeds.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    MaxTrialsExceeded,
    NoBracketFound,
    Cancelled,
    BudgetExhausted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Converged => "converged",
            Self::MaxTrialsExceeded => "max_trials_exceeded",
            Self::NoBracketFound => "no_bracket_found",
            Self::Cancelled => "cancelled",
            Self::BudgetExhausted => "budget_exhausted",
        };
        f.write_str(name)
    }
}

/// Final state of a boundary search.
///
/// `dt_star` is set only for `Converged`. `lo`/`hi` are the last bracket
/// (the scanned range when no flip was found).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryEstimate {
    pub dt_star: Option<f64>,
    pub lo: f64,
    pub hi: f64,
    pub trials: usize,
    pub reason: TerminationReason,
    /// Flat record of the trial nearest `dt_star`, with `dt` set to `dt_star`.
    pub record: Option<FlatRecord>,
}

impl BoundaryEstimate {
    pub fn is_converged(&self) -> bool {
        self.reason == TerminationReason::Converged
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    /// `dt*` for a converged search, otherwise the termination as an error.
    pub fn require_converged(&self) -> PocketResult<f64> {
        let (lo, hi, trials) = (self.lo, self.hi, self.trials);
        match (self.reason, self.dt_star) {
            (TerminationReason::Converged, Some(dt)) => Ok(dt),
            (TerminationReason::Converged, None) => Err(PocketError::InvalidParameter(
                "converged estimate without dt*".to_string(),
            )),
            (TerminationReason::NoBracketFound, _) => {
                Err(PocketError::NoBracketFound { lo, hi, trials })
            }
            (TerminationReason::MaxTrialsExceeded, _) => {
                Err(PocketError::MaxTrialsExceeded { lo, hi, trials })
            }
            (TerminationReason::Cancelled, _) => Err(PocketError::Cancelled { trials }),
            (TerminationReason::BudgetExhausted, _) => {
                Err(PocketError::BudgetExhausted { trials })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_of(values: &[f64]) -> EnergyTrace {
        EnergyTrace {
            h0: 0.0,
            baseline_step: 1,
            points: values
                .iter()
                .enumerate()
                .map(|(i, &v)| TracePoint { step: i, t: i as f64 * 0.1, h: 1.0, delta_h: v })
                .collect(),
        }
    }

    #[test]
    fn test_classify_dead_band() {
        assert_eq!(DriftSign::classify(2e-6, 1e-6), DriftSign::AntiDissipative);
        assert_eq!(DriftSign::classify(-2e-6, 1e-6), DriftSign::Dissipative);
        assert_eq!(DriftSign::classify(1e-6, 1e-6), DriftSign::Inconclusive);
        assert_eq!(DriftSign::classify(f64::NAN, 1e-6), DriftSign::Inconclusive);
    }

    #[test]
    fn test_classify_relative_scales_band() {
        assert_eq!(DriftSign::classify_relative(-1e-8, 1e-10, 1e-6), DriftSign::Dissipative);
        assert_eq!(DriftSign::classify_relative(-1e-8, 1e3, 1e-6), DriftSign::Inconclusive);
        assert_eq!(DriftSign::classify_relative(0.0, 0.0, 1e-6), DriftSign::Inconclusive);
    }

    #[test]
    fn test_flips_against() {
        use DriftSign::*;
        assert!(AntiDissipative.flips_against(Dissipative));
        assert!(!Dissipative.flips_against(Dissipative));
        assert!(!Inconclusive.flips_against(Dissipative));
    }

    #[test]
    fn test_tail_window_len_bounds() {
        assert_eq!(tail_window_len(1001, 0.2), 201);
        assert_eq!(tail_window_len(10, 0.01), 1);
        assert_eq!(tail_window_len(10, 1.0), 10);
        assert_eq!(tail_window_len(0, 0.5), 0);
    }

    #[test]
    fn test_tail_statistic_uses_suffix() {
        let trace = trace_of(&[9.0, 9.0, 9.0, 1.0, 3.0]);
        let stat = TailStatistic::from_trace(&trace, 0.4, 1e-6).unwrap();
        assert_eq!(stat.window, 2);
        assert!((stat.mean - 2.0).abs() < 1e-12, "mean={}", stat.mean);
        assert_eq!(stat.scale, 1.0);
        assert_eq!(stat.sign, DriftSign::AntiDissipative);
        let small = TailStatistic::from_trace(&trace_of(&[0.0, 1e-7]), 0.5, 1e-6).unwrap();
        assert_eq!(small.sign, DriftSign::Inconclusive);
    }

    #[test]
    fn test_tail_statistic_rejects_empty() {
        let trace = trace_of(&[]);
        assert!(TailStatistic::from_trace(&trace, 0.2, 1e-6).is_err());
        let trace = trace_of(&[1.0]);
        assert!(TailStatistic::from_trace(&trace, 1.5, 1e-6).is_err());
    }

    #[test]
    fn test_max_abs_drift() {
        let trace = trace_of(&[0.0, -0.5, 0.25]);
        assert_eq!(trace.max_abs_drift(), 0.5);
    }

    #[test]
    fn test_require_converged_maps_reasons() {
        let mut est = BoundaryEstimate {
            dt_star: Some(0.00255),
            lo: 0.00254,
            hi: 0.00256,
            trials: 8,
            reason: TerminationReason::Converged,
            record: None,
        };
        assert_eq!(est.require_converged().unwrap(), 0.00255);
        est.dt_star = None;
        est.reason = TerminationReason::NoBracketFound;
        assert!(matches!(
            est.require_converged(),
            Err(PocketError::NoBracketFound { trials: 8, .. })
        ));
        est.reason = TerminationReason::Cancelled;
        assert!(matches!(est.require_converged(), Err(PocketError::Cancelled { trials: 8 })));
    }

    #[test]
    fn test_flat_record_from_trial() {
        let trial = TrialRecord {
            index: 3,
            phase: TrialPhase::Bisect,
            dt: 0.0025,
            aggregate_sign: DriftSign::Dissipative,
            aggregate_tail_mean: -0.1,
            tail_means: vec![-0.1, -0.1],
            seeds: vec![0, 1],
            divergent_seeds: vec![],
            cap_engagement_fraction: 0.0,
            degraded: false,
        };
        let flat = trial.flat();
        assert_eq!(flat.dt, 0.0025);
        assert_eq!(flat.seeds, vec![0, 1]);
        let json = serde_json::to_value(&flat).unwrap();
        assert_eq!(json["aggregate_sign"], "dissipative");
        assert!(json.get("index").is_none());
    }
}
