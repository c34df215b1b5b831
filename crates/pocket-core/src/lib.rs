// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Aggregation and Boundary Search
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Statistical aggregator and boundary finder for locating the critical
//! step size dt* where long-run energy drift changes sign.
//!
//! # Guarantees
//!
//! 1. **Reproducible**: every run owns a generator seeded from its seed,
//!    and seeds are combined in ascending order. Identical inputs give
//!    bit-identical aggregates whatever order the seeds are listed in.
//!
//! 2. **Append-only audit trail**: every evaluated dt, inconclusive ones
//!    included, is frozen into an `Arc<TrialRecord>` in the `TrialLog`.
//!    Readers on other threads see a consistent prefix.
//!
//! 3. **Cooperative cancellation**: the `CancelHandle` is checked between
//!    seeds and between trials (`SeqCst`). A cancelled aggregation is
//!    dropped, never logged.
//!
//! 4. **Wall-clock time never changes numbers**: the optional budget only
//!    decides how many seeds are run; the trial is then marked degraded
//!    and the search stops.

pub mod aggregator;
pub mod cancel;
pub mod export;
pub mod finder;
pub mod sweep;
pub mod trials;

pub use aggregator::{Aggregate, Aggregator, DriftProbe, ExternalProbe, SeedOutcome};
pub use cancel::CancelHandle;
pub use finder::{BoundaryFinder, Search};
pub use sweep::{cap_sweep, plateau_audit, CapSweepRow, PlateauAudit, PlateauPoint, SlopeSummary};
pub use trials::{TrialCursor, TrialLog};
