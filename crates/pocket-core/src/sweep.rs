// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — dt Sweeps: Cap Engagement, Plateau Audit, Slope Fit
// ─────────────────────────────────────────────────────────────────────
//! Fixed-grid sweeps over dt built on the aggregator, producing the
//! records consumed by the figure tooling.

use serde::{Deserialize, Serialize};

use pocket_types::PocketResult;

use crate::aggregator::Aggregator;
use crate::cancel::CancelHandle;

/// Two-sided 95 % normal quantile.
const Z95: f64 = 1.96;

/// Cap-engagement statistics at one dt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapSweepRow {
    pub dt: f64,
    pub fraction_capped_mean: f64,
    pub fraction_capped_ci95_low: f64,
    pub fraction_capped_ci95_high: f64,
}

impl CapSweepRow {
    /// Normal-approximation CI over per-seed fractions, clamped to [0, 1].
    pub fn from_fractions(dt: f64, fractions: &[f64]) -> Self {
        let n = fractions.len();
        if n == 0 {
            return Self {
                dt,
                fraction_capped_mean: 0.0,
                fraction_capped_ci95_low: 0.0,
                fraction_capped_ci95_high: 0.0,
            };
        }
        let mean = fractions.iter().sum::<f64>() / n as f64;
        let half = if n > 1 {
            let var = fractions.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            Z95 * var.sqrt() / (n as f64).sqrt()
        } else {
            0.0
        };
        Self {
            dt,
            fraction_capped_mean: mean,
            fraction_capped_ci95_low: (mean - half).clamp(0.0, 1.0),
            fraction_capped_ci95_high: (mean + half).clamp(0.0, 1.0),
        }
    }
}

/// Cap-engagement fraction across `dts`.
pub fn cap_sweep(
    aggregator: &Aggregator,
    dts: &[f64],
    cancel: &CancelHandle,
) -> PocketResult<Vec<CapSweepRow>> {
    if aggregator.config().energy_cap.is_none() {
        log::warn!("cap sweep without an energy cap: every fraction will be zero");
    }
    dts.iter()
        .map(|&dt| {
            let agg = aggregator.aggregate(dt, cancel)?;
            Ok(CapSweepRow::from_fractions(dt, &agg.cap_fractions))
        })
        .collect()
}

/// Median `|tail mean ΔH|` at one dt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauPoint {
    pub dt: f64,
    pub tail_median: f64,
    /// Non-divergent seeds contributing to the median.
    pub runs: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlateauAudit {
    pub series: Vec<PlateauPoint>,
}

impl PlateauAudit {
    /// Log-log slope of `tail_median` against dt.
    pub fn slope(&self) -> Option<SlopeSummary> {
        let points: Vec<[f64; 2]> = self.series.iter().map(|p| [p.dt, p.tail_median]).collect();
        SlopeSummary::fit(&points)
    }
}

pub fn plateau_audit(
    aggregator: &Aggregator,
    dts: &[f64],
    cancel: &CancelHandle,
) -> PocketResult<PlateauAudit> {
    let mut series = Vec::with_capacity(dts.len());
    for &dt in dts {
        let agg = aggregator.aggregate(dt, cancel)?;
        let magnitudes: Vec<f64> = agg.tail_means.iter().map(|m| m.abs()).collect();
        series.push(PlateauPoint {
            dt,
            tail_median: median(&magnitudes),
            runs: magnitudes.len(),
        });
    }
    Ok(PlateauAudit { series })
}

/// Median of a slice; NaN when empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// OLS fit of `log10(y) = m·log10(x) + b` with a 95 % CI on `m`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopeSummary {
    pub points: Vec<[f64; 2]>,
    pub n: usize,
    pub m: f64,
    pub b: f64,
    pub lo: f64,
    pub hi: f64,
    pub r2: f64,
}

/// Two-tailed 95 % t critical value, coarse small-sample table.
fn t_critical(df: isize) -> f64 {
    match df {
        d if d <= 0 => 1.96,
        1 => 12.706,
        2 => 4.303,
        d if d <= 20 => 2.086,
        _ => 1.96,
    }
}

impl SlopeSummary {
    /// Fit over the strictly positive points. `None` with fewer than three
    /// or when every x is the same.
    pub fn fit(points: &[[f64; 2]]) -> Option<Self> {
        let used: Vec<[f64; 2]> = points
            .iter()
            .copied()
            .filter(|[x, y]| *x > 0.0 && *y > 0.0 && x.is_finite() && y.is_finite())
            .collect();
        let n = used.len();
        if n < 3 {
            return None;
        }
        let lx: Vec<f64> = used.iter().map(|p| p[0].log10()).collect();
        let ly: Vec<f64> = used.iter().map(|p| p[1].log10()).collect();
        let xm = lx.iter().sum::<f64>() / n as f64;
        let ym = ly.iter().sum::<f64>() / n as f64;
        let sxx: f64 = lx.iter().map(|x| (x - xm).powi(2)).sum();
        if sxx == 0.0 {
            return None;
        }
        let sxy: f64 = lx.iter().zip(&ly).map(|(x, y)| (x - xm) * (y - ym)).sum();
        let m = sxy / sxx;
        let b = ym - m * xm;
        let rss: f64 = lx.iter().zip(&ly).map(|(x, y)| (y - (m * x + b)).powi(2)).sum();
        let tss: f64 = ly.iter().map(|y| (y - ym).powi(2)).sum();
        let r2 = if tss == 0.0 { 0.0 } else { 1.0 - rss / tss };

        let df = n as isize - 2;
        let s2 = rss / df.max(1) as f64;
        let se = (s2 / sxx).sqrt();
        let t = t_critical(df);
        Some(Self {
            points: used,
            n,
            m,
            b,
            lo: m - t * se,
            hi: m + t * se,
            r2,
        })
    }
}
