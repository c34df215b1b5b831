// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Run, Ensemble and Search Configuration
// ─────────────────────────────────────────────────────────────────────

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, ensure_positive, PocketError, PocketResult};

/// Integration scheme used by the integrator core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Half-kick, drift, half-kick. Symplectic and time-reversible.
    #[default]
    Leapfrog,
    /// Synchronous explicit update. Non-symplectic baseline.
    Euler,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leapfrog => f.write_str("leapfrog"),
            Self::Euler => f.write_str("euler"),
        }
    }
}

impl FromStr for Scheme {
    type Err = PocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leapfrog" => Ok(Self::Leapfrog),
            "euler" => Ok(Self::Euler),
            other => Err(PocketError::InvalidParameter(format!(
                "unknown scheme '{other}' (expected leapfrog | euler)"
            ))),
        }
    }
}

/// Where the per-step Gaussian perturbation enters the dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseChannel {
    #[default]
    None,
    /// Added to `q` after the deterministic update.
    Position,
    /// Added to `p` after the deterministic update.
    Momentum,
    /// Added to the potential gradient at every force evaluation.
    Gradient,
}

impl fmt::Display for NoiseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Position => "position",
            Self::Momentum => "momentum",
            Self::Gradient => "gradient",
        };
        f.write_str(name)
    }
}

impl FromStr for NoiseChannel {
    type Err = PocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "position" | "pos" => Ok(Self::Position),
            "momentum" | "mom" => Ok(Self::Momentum),
            "gradient" | "grad" => Ok(Self::Gradient),
            other => Err(PocketError::InvalidParameter(format!(
                "unknown noise channel '{other}' (expected none | position | momentum | gradient)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub channel: NoiseChannel,
    /// Standard deviation of the per-step draw.
    pub sigma: f64,
}

impl NoiseConfig {
    pub fn new(channel: NoiseChannel, sigma: f64) -> Self {
        Self { channel, sigma }
    }

    pub fn gradient(sigma: f64) -> Self {
        Self::new(NoiseChannel::Gradient, sigma)
    }

    /// True when a draw is consumed every step.
    pub fn is_active(&self) -> bool {
        self.channel != NoiseChannel::None
    }

    pub fn validate(&self) -> PocketResult<()> {
        ensure_non_negative("noise.sigma", self.sigma)
    }
}

/// Damped, driven harmonic oscillator.
///
/// `H = p²/(2m) + ½·k·q²`, `dp/dt = F − k·q − γ·p`. The constant drive `F`
/// is an external force and does not enter `H`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorModel {
    /// Spring constant k.
    pub stiffness: f64,
    /// Linear damping rate γ.
    pub damping: f64,
    /// Constant external force F.
    pub drive: f64,
    pub initial_q: f64,
    pub initial_p: f64,
    /// Scale of the seed-derived Gaussian offset applied to `initial_q`.
    pub initial_jitter: f64,
}

impl Default for OscillatorModel {
    fn default() -> Self {
        Self {
            stiffness: 1.0,
            damping: 0.0,
            drive: 0.0,
            initial_q: 0.1,
            initial_p: 0.0,
            initial_jitter: 0.0,
        }
    }
}

impl OscillatorModel {
    /// Heavily damped, nearly free particle starting at rest and heated
    /// only by noise.
    ///
    /// Under gradient noise the leapfrog energy residual is positive while
    /// `γ·dt` is below about 4.3 and negative above it, so the drift sign
    /// flips near dt ≈ 2.5e-3 whatever the step count.
    pub fn pocket_benchmark() -> Self {
        Self {
            stiffness: 1e-4,
            damping: 1720.0,
            drive: 0.0,
            initial_q: 0.0,
            initial_p: 0.0,
            initial_jitter: 0.0,
        }
    }

    pub fn validate(&self) -> PocketResult<()> {
        ensure_positive("model.stiffness", self.stiffness)?;
        ensure_non_negative("model.damping", self.damping)?;
        ensure_non_negative("model.initial_jitter", self.initial_jitter)?;
        for (name, value) in [
            ("model.drive", self.drive),
            ("model.initial_q", self.initial_q),
            ("model.initial_p", self.initial_p),
        ] {
            if !value.is_finite() {
                return Err(PocketError::InvalidParameter(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Everything a single seeded run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub scheme: Scheme,
    pub dt: f64,
    pub steps: usize,
    pub mass: f64,
    pub noise: NoiseConfig,
    /// Maximum allowed `|ΔH|` (energy residual) after the baseline step.
    /// `None` disables.
    pub energy_cap: Option<f64>,
    pub seed: u64,
    /// Step at which `H0` is captured. Default: 1 (right after the first step).
    pub baseline_step: usize,
    pub model: OscillatorModel,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Leapfrog,
            dt: 0.003,
            steps: 1000,
            mass: 0.35,
            noise: NoiseConfig::default(),
            energy_cap: None,
            seed: 0,
            baseline_step: 1,
            model: OscillatorModel::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> PocketResult<()> {
        ensure_positive("dt", self.dt)?;
        validate_template(
            self.mass,
            self.steps,
            &self.noise,
            self.energy_cap,
            self.baseline_step,
            &self.model,
        )
    }
}

fn validate_template(
    mass: f64,
    steps: usize,
    noise: &NoiseConfig,
    energy_cap: Option<f64>,
    baseline_step: usize,
    model: &OscillatorModel,
) -> PocketResult<()> {
    ensure_positive("mass", mass)?;
    if steps == 0 {
        return Err(PocketError::InvalidParameter(
            "steps must be > 0".to_string(),
        ));
    }
    noise.validate()?;
    if let Some(cap) = energy_cap {
        ensure_positive("energy_cap", cap)?;
    }
    if baseline_step > steps {
        return Err(PocketError::InvalidParameter(format!(
            "baseline_step must be <= steps ({steps}), got {baseline_step}"
        )));
    }
    model.validate()
}

/// Multi-seed template evaluated at one dt by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub scheme: Scheme,
    pub mass: f64,
    pub steps: usize,
    pub noise: NoiseConfig,
    pub energy_cap: Option<f64>,
    pub baseline_step: usize,
    /// Fraction of the trace (from the end) averaged into the tail statistic.
    pub tail_fraction: f64,
    /// Dead band for sign classification, relative to the mean tail energy.
    pub epsilon: f64,
    pub seeds: Vec<u64>,
    pub model: OscillatorModel,
    /// Wall-clock budget for one aggregation. `None` disables.
    pub budget_ms: Option<u64>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Leapfrog,
            mass: 0.35,
            steps: 1000,
            noise: NoiseConfig::gradient(0.2),
            energy_cap: None,
            baseline_step: 1,
            tail_fraction: 0.2,
            epsilon: 1e-6,
            seeds: (0..20).collect(),
            model: OscillatorModel::pocket_benchmark(),
            budget_ms: None,
        }
    }
}

impl EnsembleConfig {
    /// Replace the seed list with `0..count`.
    pub fn with_seed_count(mut self, count: u64) -> Self {
        self.seeds = (0..count).collect();
        self
    }

    /// Concrete run for one `(dt, seed)` pair.
    pub fn run_config(&self, dt: f64, seed: u64) -> RunConfig {
        RunConfig {
            scheme: self.scheme,
            dt,
            steps: self.steps,
            mass: self.mass,
            noise: self.noise,
            energy_cap: self.energy_cap,
            seed,
            baseline_step: self.baseline_step,
            model: self.model,
        }
    }

    pub fn validate(&self) -> PocketResult<()> {
        validate_template(
            self.mass,
            self.steps,
            &self.noise,
            self.energy_cap,
            self.baseline_step,
            &self.model,
        )?;
        if !(self.tail_fraction > 0.0 && self.tail_fraction <= 1.0) {
            return Err(PocketError::InvalidParameter(format!(
                "tail_fraction must be in (0, 1], got {}",
                self.tail_fraction
            )));
        }
        ensure_non_negative("epsilon", self.epsilon)?;
        if self.seeds.is_empty() {
            return Err(PocketError::InvalidParameter(
                "at least one seed is required".to_string(),
            ));
        }
        if self.budget_ms == Some(0) {
            return Err(PocketError::InvalidParameter(
                "budget_ms must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Placement of the interior scan points between `lo` and `hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSpacing {
    #[default]
    Linear,
    Geometric,
}

impl FromStr for ScanSpacing {
    type Err = PocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "geometric" | "log" => Ok(Self::Geometric),
            other => Err(PocketError::InvalidParameter(format!(
                "unknown scan spacing '{other}' (expected linear | geometric)"
            ))),
        }
    }
}

/// Boundary search over `[lo, hi]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub lo: f64,
    pub hi: f64,
    /// Converged once `hi − lo <= tolerance`.
    pub tolerance: f64,
    /// Interior points evaluated when the endpoints do not bracket a flip.
    pub scan_budget: usize,
    /// Total trials (endpoints, scan and bisection) before giving up.
    pub max_trials: usize,
    pub spacing: ScanSpacing,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lo: 0.0022,
            hi: 0.0028,
            tolerance: 1e-5,
            scan_budget: 8,
            max_trials: 40,
            spacing: ScanSpacing::Linear,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> PocketResult<()> {
        ensure_positive("search.lo", self.lo)?;
        ensure_positive("search.hi", self.hi)?;
        if self.hi <= self.lo {
            return Err(PocketError::InvalidParameter(format!(
                "search.hi must be > search.lo, got [{}, {}]",
                self.lo, self.hi
            )));
        }
        ensure_positive("search.tolerance", self.tolerance)?;
        if self.max_trials < 2 {
            return Err(PocketError::InvalidParameter(format!(
                "max_trials must be >= 2 (both endpoints), got {}",
                self.max_trials
            )));
        }
        Ok(())
    }
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketConfig {
    pub ensemble: EnsembleConfig,
    pub search: SearchConfig,
}

impl PocketConfig {
    pub fn validate(&self) -> PocketResult<()> {
        self.ensemble.validate()?;
        self.search.validate()
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> PocketResult<Self> {
        serde_json::from_str(json).map_err(|e| PocketError::Config(format!("JSON parse error: {e}")))
    }

    pub fn to_json(&self) -> PocketResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RunConfig::default().validate().is_ok());
        assert!(EnsembleConfig::default().validate().is_ok());
        assert!(SearchConfig::default().validate().is_ok());
        assert!(PocketConfig::default().validate().is_ok());
    }

    #[test]
    fn test_run_config_rejects_bad_values() {
        let cases: Vec<RunConfig> = vec![
            RunConfig { mass: 0.0, ..Default::default() },
            RunConfig { dt: -0.01, ..Default::default() },
            RunConfig { dt: f64::NAN, ..Default::default() },
            RunConfig { steps: 0, ..Default::default() },
            RunConfig { noise: NoiseConfig::gradient(-0.1), ..Default::default() },
            RunConfig { energy_cap: Some(0.0), ..Default::default() },
            RunConfig { baseline_step: 1001, ..Default::default() },
        ];
        for cfg in cases {
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, PocketError::InvalidParameter(_)), "{err}");
        }
    }

    #[test]
    fn test_model_rejects_non_finite_drive() {
        let model = OscillatorModel { drive: f64::INFINITY, ..Default::default() };
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_pocket_benchmark_starts_at_rest() {
        let model = OscillatorModel::pocket_benchmark();
        assert_eq!((model.initial_q, model.initial_p, model.drive), (0.0, 0.0, 0.0));
        // γ·dt crosses ~4.3 inside the reference bracket [0.0022, 0.0028].
        assert!(model.damping * 0.0022 < 4.3 && model.damping * 0.0028 > 4.3);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_run_config_from_ensemble() {
        let ens = EnsembleConfig::default();
        let run = ens.run_config(0.0025, 7);
        assert_eq!(run.seed, 7);
        assert_eq!(run.dt, 0.0025);
        assert_eq!(run.steps, ens.steps);
        assert_eq!(run.noise, ens.noise);
        assert!(run.validate().is_ok());
    }

    #[test]
    fn test_ensemble_validation() {
        assert!(EnsembleConfig::default().with_seed_count(0).validate().is_err());
        let cfg = EnsembleConfig { tail_fraction: 0.0, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = EnsembleConfig { tail_fraction: 1.0, ..Default::default() };
        assert!(cfg.validate().is_ok());
        let cfg = EnsembleConfig { budget_ms: Some(0), ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_search_validation() {
        let cfg = SearchConfig { lo: 0.01, hi: 0.005, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = SearchConfig { max_trials: 1, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{"search": {"lo": 0.006, "hi": 0.016}, "ensemble": {"noise": {"channel": "momentum", "sigma": 0.1}}}"#;
        let cfg = PocketConfig::from_json(json).unwrap();
        assert_eq!(cfg.search.lo, 0.006);
        assert_eq!(cfg.search.tolerance, 1e-5);
        assert_eq!(cfg.ensemble.noise.channel, NoiseChannel::Momentum);
        assert_eq!(cfg.ensemble.seeds.len(), 20);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = PocketConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, PocketError::Config(_)));
    }

    #[test]
    fn test_json_roundtrip_preserves_config() {
        let cfg = PocketConfig::default();
        let back = PocketConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Euler".parse::<Scheme>().unwrap(), Scheme::Euler);
        assert_eq!("grad".parse::<NoiseChannel>().unwrap(), NoiseChannel::Gradient);
        assert_eq!("geometric".parse::<ScanSpacing>().unwrap(), ScanSpacing::Geometric);
        assert!("rk4".parse::<Scheme>().is_err());
    }
}
