// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — CLI Argument Groups
// ─────────────────────────────────────────────────────────────────────

use anyhow::{bail, Result};
use clap::Args;

use pocket_types::{EnsembleConfig, NoiseChannel, ScanSpacing, Scheme, SearchConfig};

/// Model, noise and ensemble flags. Unset flags keep the config value.
#[derive(Args, Debug, Clone, Default)]
pub struct EnsembleArgs {
    /// Named model preset (harmonic | pocket_benchmark).
    #[arg(long)]
    pub preset: Option<String>,
    #[arg(long)]
    pub scheme: Option<Scheme>,
    #[arg(long)]
    pub mass: Option<f64>,
    #[arg(long)]
    pub steps: Option<usize>,
    /// Noise channel (none | position | momentum | gradient).
    #[arg(long)]
    pub noise: Option<NoiseChannel>,
    #[arg(long)]
    pub sigma: Option<f64>,
    /// Energy cap on the residual |ΔH|; pass 0 to disable.
    #[arg(long)]
    pub cap: Option<f64>,
    #[arg(long)]
    pub baseline_step: Option<usize>,
    #[arg(long)]
    pub tail_fraction: Option<f64>,
    #[arg(long)]
    pub epsilon: Option<f64>,
    /// Use seeds 0..N.
    #[arg(long)]
    pub seeds: Option<u64>,
    /// Per-aggregation wall-clock budget in milliseconds.
    #[arg(long)]
    pub budget_ms: Option<u64>,
    #[arg(long)]
    pub stiffness: Option<f64>,
    #[arg(long)]
    pub damping: Option<f64>,
    #[arg(long)]
    pub drive: Option<f64>,
    #[arg(long)]
    pub q0: Option<f64>,
    #[arg(long)]
    pub p0: Option<f64>,
    #[arg(long)]
    pub jitter: Option<f64>,
}

impl EnsembleArgs {
    pub fn apply(&self, cfg: &mut EnsembleConfig) -> Result<()> {
        if let Some(name) = &self.preset {
            cfg.model = pocket_physics::preset(name)?;
        }
        if let Some(v) = self.scheme {
            cfg.scheme = v;
        }
        if let Some(v) = self.mass {
            cfg.mass = v;
        }
        if let Some(v) = self.steps {
            cfg.steps = v;
        }
        if let Some(v) = self.noise {
            cfg.noise.channel = v;
        }
        if let Some(v) = self.sigma {
            cfg.noise.sigma = v;
        }
        if let Some(v) = self.cap {
            cfg.energy_cap = (v > 0.0).then_some(v);
        }
        if let Some(v) = self.baseline_step {
            cfg.baseline_step = v;
        }
        if let Some(v) = self.tail_fraction {
            cfg.tail_fraction = v;
        }
        if let Some(v) = self.epsilon {
            cfg.epsilon = v;
        }
        if let Some(n) = self.seeds {
            cfg.seeds = (0..n).collect();
        }
        if let Some(v) = self.budget_ms {
            cfg.budget_ms = Some(v);
        }
        let model = &mut cfg.model;
        for (slot, value) in [
            (&mut model.stiffness, self.stiffness),
            (&mut model.damping, self.damping),
            (&mut model.drive, self.drive),
            (&mut model.initial_q, self.q0),
            (&mut model.initial_p, self.p0),
            (&mut model.initial_jitter, self.jitter),
        ] {
            if let Some(v) = value {
                *slot = v;
            }
        }
        cfg.validate()?;
        Ok(())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    #[arg(long)]
    pub lo: Option<f64>,
    #[arg(long)]
    pub hi: Option<f64>,
    #[arg(long)]
    pub tolerance: Option<f64>,
    #[arg(long)]
    pub scan_budget: Option<usize>,
    #[arg(long)]
    pub max_trials: Option<usize>,
    /// Scan spacing (linear | geometric).
    #[arg(long)]
    pub spacing: Option<ScanSpacing>,
}

impl SearchArgs {
    pub fn apply(&self, cfg: &mut SearchConfig) -> Result<()> {
        if let Some(v) = self.lo {
            cfg.lo = v;
        }
        if let Some(v) = self.hi {
            cfg.hi = v;
        }
        if let Some(v) = self.tolerance {
            cfg.tolerance = v;
        }
        if let Some(v) = self.scan_budget {
            cfg.scan_budget = v;
        }
        if let Some(v) = self.max_trials {
            cfg.max_trials = v;
        }
        if let Some(v) = self.spacing {
            cfg.spacing = v;
        }
        cfg.validate()?;
        Ok(())
    }
}

/// dt grid for the sweep commands: an explicit list or `count` points
/// spaced geometrically between `from` and `to`.
#[derive(Args, Debug, Clone, Default)]
pub struct GridArgs {
    #[arg(long, value_delimiter = ',')]
    pub dts: Vec<f64>,
    #[arg(long)]
    pub from: Option<f64>,
    #[arg(long)]
    pub to: Option<f64>,
    #[arg(long, default_value_t = 8)]
    pub count: usize,
}

impl GridArgs {
    pub fn resolve(&self) -> Result<Vec<f64>> {
        if !self.dts.is_empty() {
            return Ok(self.dts.clone());
        }
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > 0.0 && to > from && self.count >= 2 => {
                let last = (self.count - 1) as f64;
                Ok((0..self.count)
                    .map(|i| from * (to / from).powf(i as f64 / last))
                    .collect())
            }
            (Some(_), Some(_)) => bail!("--from/--to need 0 < from < to and --count >= 2"),
            _ => bail!("pass --dts or both --from and --to"),
        }
    }
}
