// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Configuration, error hierarchy and exchange records shared by the
//! integrator, the statistical aggregator and the boundary finder.

pub mod config;
pub mod error;
pub mod record;

pub use config::{
    EnsembleConfig, NoiseChannel, NoiseConfig, OscillatorModel, PocketConfig, RunConfig,
    ScanSpacing, Scheme, SearchConfig,
};
pub use error::{PocketError, PocketResult};
pub use record::{
    BoundaryEstimate, DriftSign, EnergyTrace, FlatRecord, TailStatistic, TerminationReason,
    TracePoint, TrialPhase, TrialRecord,
};
