// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — JSON / CSV Export
// ─────────────────────────────────────────────────────────────────────

use std::sync::Arc;

use serde::Serialize;

use pocket_types::{BoundaryEstimate, FlatRecord, PocketResult, TrialRecord};

use crate::sweep::CapSweepRow;

pub const TRIALS_CSV_HEADER: &str =
    "dt,aggregate_sign,aggregate_tail_mean,cap_engagement_fraction,divergent_seeds,tail_means,seeds";

pub const CAP_SWEEP_CSV_HEADER: &str =
    "dt,fraction_capped_mean,fraction_capped_ci95_low,fraction_capped_ci95_high";

/// Trials as a JSON array of flat records.
pub fn trials_to_json(trials: &[Arc<TrialRecord>]) -> PocketResult<String> {
    let flat: Vec<FlatRecord> = trials.iter().map(|t| t.flat()).collect();
    Ok(serde_json::to_string_pretty(&flat)?)
}

/// Trials as CSV; list columns are `;`-separated.
pub fn trials_to_csv(trials: &[Arc<TrialRecord>]) -> String {
    let mut csv = String::from(TRIALS_CSV_HEADER);
    csv.push('\n');
    for t in trials {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            t.dt,
            t.aggregate_sign,
            t.aggregate_tail_mean,
            t.cap_engagement_fraction,
            join(&t.divergent_seeds),
            join(&t.tail_means),
            join(&t.seeds),
        ));
    }
    csv
}

#[derive(Serialize)]
struct EstimateDocument<'a> {
    #[serde(flatten)]
    estimate: &'a BoundaryEstimate,
    tolerance: f64,
}

/// Estimate plus the tolerance it was searched to.
pub fn estimate_to_json(estimate: &BoundaryEstimate, tolerance: f64) -> PocketResult<String> {
    Ok(serde_json::to_string_pretty(&EstimateDocument { estimate, tolerance })?)
}

pub fn cap_sweep_to_csv(rows: &[CapSweepRow]) -> String {
    let mut csv = String::from(CAP_SWEEP_CSV_HEADER);
    csv.push('\n');
    for r in rows {
        csv.push_str(&format!(
            "{},{:.6},{:.6},{:.6}\n",
            r.dt, r.fraction_capped_mean, r.fraction_capped_ci95_low, r.fraction_capped_ci95_high
        ));
    }
    csv
}

fn join<T: ToString>(values: &[T]) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(";")
}
