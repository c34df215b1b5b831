// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for every pocket-finder failure.
///
/// Run-level failures (`InvalidParameter`, `NumericDivergence`) come out of
/// the integrator and executor. Search-level outcomes (`NoBracketFound`,
/// `MaxTrialsExceeded`, `Cancelled`, `BudgetExhausted`) are produced only
/// when a non-converged search is turned into a `Result`.
#[derive(Error, Debug)]
pub enum PocketError {
    /// Bad configuration, rejected before any run starts.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The Hamiltonian became NaN or Inf during a run.
    #[error("numeric divergence at step {step} (t = {t:.6}): H = {h}")]
    NumericDivergence { step: usize, t: f64, h: f64 },

    /// No sign change between any adjacent scanned step sizes.
    #[error("no bracket found in [{lo}, {hi}] after {trials} trials")]
    NoBracketFound { lo: f64, hi: f64, trials: usize },

    /// Trial budget consumed before the bracket narrowed to tolerance.
    #[error("max trials exceeded ({trials}); best bracket [{lo}, {hi}]")]
    MaxTrialsExceeded { lo: f64, hi: f64, trials: usize },

    /// Search cancelled between trials by the host.
    #[error("search cancelled after {trials} trials")]
    Cancelled { trials: usize },

    /// Wall-clock budget exhausted during an aggregation pass.
    #[error("wall-clock budget exhausted after {trials} trials")]
    BudgetExhausted { trials: usize },

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PocketResult<T> = Result<T, PocketError>;

/// Reject a value that is not strictly positive and finite.
pub fn ensure_positive(name: &str, value: f64) -> PocketResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PocketError::InvalidParameter(format!(
            "{name} must be finite and > 0, got {value}"
        )));
    }
    Ok(())
}

/// Reject a value that is negative or not finite.
pub fn ensure_non_negative(name: &str, value: f64) -> PocketResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PocketError::InvalidParameter(format!(
            "{name} must be finite and >= 0, got {value}"
        )));
    }
    Ok(())
}
