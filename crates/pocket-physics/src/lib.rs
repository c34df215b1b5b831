// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Oscillator Physics
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Integrator core and run executor: leapfrog/Euler stepping of a damped,
//! driven oscillator with seeded Gaussian noise, energy drift traces with
//! an optional safety cap, and the forward/backward reversibility check.

pub mod integrator;
pub mod noise;
pub mod params;
pub mod reversibility;
pub mod run;

pub use integrator::{Integrator, OscillatorState, StepEnergy};
pub use noise::NoiseSource;
pub use params::{preset, PRESET_NAMES};
pub use reversibility::{reversibility_report, round_trip_error, ReversibilityReport};
pub use run::{execute, RunExecutor, RunOutcome, TraceSample, TraceStream};
