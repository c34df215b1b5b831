// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Command-Line Driver
// ─────────────────────────────────────────────────────────────────────

mod args;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pocket_core::export::{cap_sweep_to_csv, estimate_to_json, trials_to_csv, trials_to_json};
use pocket_core::{cap_sweep, plateau_audit, Aggregator, BoundaryFinder, CancelHandle, SlopeSummary};
use pocket_physics::{execute, reversibility_report, ReversibilityReport};
use pocket_types::{PocketConfig, TailStatistic, TerminationReason};

use crate::args::{EnsembleArgs, GridArgs, SearchArgs};

#[derive(Parser, Debug)]
#[command(name = "pocket", version, about = "Locate the dt where energy drift changes sign")]
struct Cli {
    /// JSON config file; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write the result here instead of stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Single run: trace, tail statistic and cap engagement.
    Run {
        #[arg(long)]
        dt: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[command(flatten)]
        ensemble: EnsembleArgs,
    },
    /// Aggregate sign over the seed ensemble at one dt.
    Classify {
        #[arg(long)]
        dt: f64,
        #[command(flatten)]
        ensemble: EnsembleArgs,
    },
    /// Bracket and bisect for dt*.
    Search {
        #[command(flatten)]
        ensemble: EnsembleArgs,
        #[command(flatten)]
        search: SearchArgs,
        /// Also write every trial record here.
        #[arg(long)]
        trials_out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = TrialsFormat::Csv)]
        trials_format: TrialsFormat,
    },
    /// Cap-engagement fraction with a 95 % CI across a dt grid.
    CapSweep {
        #[command(flatten)]
        ensemble: EnsembleArgs,
        #[command(flatten)]
        grid: GridArgs,
        #[arg(long)]
        json: bool,
    },
    /// Median |tail ΔH| across a dt grid plus the log-log slope.
    Plateau {
        #[command(flatten)]
        ensemble: EnsembleArgs,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Forward/backward round-trip error, leapfrog vs Euler.
    Reversibility {
        #[arg(long, default_value_t = 0.01)]
        dt: f64,
        #[arg(long, default_value_t = 1000)]
        k: usize,
        #[command(flatten)]
        ensemble: EnsembleArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TrialsFormat {
    Csv,
    Json,
}

#[derive(Serialize)]
struct RunReport {
    dt: f64,
    seed: u64,
    h0: f64,
    max_abs_drift: f64,
    tail: TailStatistic,
    cap_engagement_fraction: f64,
    trace: pocket_types::EnergyTrace,
}

#[derive(Serialize)]
struct PlateauReport {
    series: Vec<pocket_core::PlateauPoint>,
    slope: Option<SlopeSummary>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base = load_config(cli.config.as_deref())?;
    let body = dispatch(cli.command, base)?;
    emit(cli.out.as_deref(), &body)
}

fn load_config(path: Option<&Path>) -> Result<PocketConfig> {
    let Some(path) = path else {
        return Ok(PocketConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = PocketConfig::from_json(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn emit(out: Option<&Path>, body: &str) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote result");
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn dispatch(command: Command, mut config: PocketConfig) -> Result<String> {
    let cancel = CancelHandle::new();
    match command {
        Command::Run { dt, seed, ensemble } => {
            ensemble.apply(&mut config.ensemble)?;
            let cfg = &config.ensemble;
            let outcome = execute(cfg.run_config(dt, seed))
                .with_context(|| format!("run at dt={dt} seed={seed}"))?;
            let tail = TailStatistic::from_trace(&outcome.trace, cfg.tail_fraction, cfg.epsilon)?;
            info!(dt, seed, sign = %tail.sign, tail_mean = tail.mean, "run finished");
            let report = RunReport {
                dt,
                seed,
                h0: outcome.trace.h0,
                max_abs_drift: outcome.trace.max_abs_drift(),
                tail,
                cap_engagement_fraction: outcome.cap_engagement_fraction(),
                trace: outcome.trace,
            };
            Ok(serde_json::to_string_pretty(&report)?)
        }
        Command::Classify { dt, ensemble } => {
            ensemble.apply(&mut config.ensemble)?;
            let aggregator = Aggregator::new(config.ensemble)?;
            let aggregate = aggregator.aggregate(dt, &cancel)?;
            info!(
                dt,
                sign = %aggregate.sign,
                tail_mean = aggregate.tail_mean,
                divergent = aggregate.divergent_seeds.len(),
                "classified"
            );
            Ok(serde_json::to_string_pretty(&aggregate)?)
        }
        Command::Search { ensemble, search, trials_out, trials_format } => {
            ensemble.apply(&mut config.ensemble)?;
            search.apply(&mut config.search)?;
            let tolerance = config.search.tolerance;
            let finder = BoundaryFinder::new(Aggregator::new(config.ensemble)?, config.search)?;
            let mut run = finder.search();
            for trial in run.by_ref() {
                info!(
                    index = trial.index,
                    phase = ?trial.phase,
                    dt = trial.dt,
                    sign = %trial.aggregate_sign,
                    tail_mean = trial.aggregate_tail_mean,
                    "trial"
                );
            }
            let estimate = run.finish()?;
            match estimate.reason {
                TerminationReason::Converged => {
                    info!(dt_star = ?estimate.dt_star, trials = estimate.trials, "converged")
                }
                reason => warn!(%reason, lo = estimate.lo, hi = estimate.hi, "search stopped"),
            }
            if let Some(path) = trials_out {
                let trials = finder.trial_log().snapshot();
                let body = match trials_format {
                    TrialsFormat::Csv => trials_to_csv(&trials),
                    TrialsFormat::Json => trials_to_json(&trials)?,
                };
                fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
            }
            Ok(estimate_to_json(&estimate, tolerance)?)
        }
        Command::CapSweep { ensemble, grid, json } => {
            ensemble.apply(&mut config.ensemble)?;
            let dts = grid.resolve()?;
            let rows = cap_sweep(&Aggregator::new(config.ensemble)?, &dts, &cancel)?;
            if json {
                Ok(serde_json::to_string_pretty(&rows)?)
            } else {
                Ok(cap_sweep_to_csv(&rows))
            }
        }
        Command::Plateau { ensemble, grid } => {
            ensemble.apply(&mut config.ensemble)?;
            let dts = grid.resolve()?;
            let audit = plateau_audit(&Aggregator::new(config.ensemble)?, &dts, &cancel)?;
            let slope = audit.slope();
            if slope.is_none() {
                warn!("fewer than three positive medians; no slope fitted");
            }
            Ok(serde_json::to_string_pretty(&PlateauReport { series: audit.series, slope })?)
        }
        Command::Reversibility { dt, k, ensemble } => {
            ensemble.apply(&mut config.ensemble)?;
            let report: ReversibilityReport =
                reversibility_report(&config.ensemble.model, config.ensemble.mass, dt, k)?;
            Ok(serde_json::to_string_pretty(&report)?)
        }
    }
}
