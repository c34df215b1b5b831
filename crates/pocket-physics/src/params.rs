// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Model Presets and Derived Scales
// ─────────────────────────────────────────────────────────────────────
//! Named oscillator presets and the stability limits derived from a model.

use pocket_types::{OscillatorModel, PocketError, PocketResult};

pub const PRESET_NAMES: [&str; 2] = ["harmonic", "pocket_benchmark"];

/// Look up a preset by name.
///
/// - `harmonic`: `k = 1`, undamped, undriven, `q0 = 0.1`.
/// - `pocket_benchmark`: heavily damped, noise-heated particle at rest; the
///   leapfrog drift sign flips near `γ·dt ≈ 4.3`, i.e. dt ≈ 2.5e-3.
pub fn preset(name: &str) -> PocketResult<OscillatorModel> {
    match name {
        "harmonic" => Ok(OscillatorModel::default()),
        "pocket_benchmark" | "benchmark" => Ok(OscillatorModel::pocket_benchmark()),
        other => Err(PocketError::InvalidParameter(format!(
            "unknown model preset '{other}' (expected one of {})",
            PRESET_NAMES.join(", ")
        ))),
    }
}

/// Undamped angular frequency `ω = √(k/m)`.
pub fn natural_frequency(model: &OscillatorModel, mass: f64) -> f64 {
    (model.stiffness / mass).sqrt()
}

/// Largest dt for which undamped leapfrog stays bounded: `2/ω`.
pub fn leapfrog_stability_limit(model: &OscillatorModel, mass: f64) -> f64 {
    2.0 / natural_frequency(model, mass)
}

/// Largest dt for which explicit Euler damps momentum rather than
/// amplifying it: `2/γ`. Infinite without damping.
pub fn euler_damping_limit(model: &OscillatorModel) -> f64 {
    if model.damping > 0.0 {
        2.0 / model.damping
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        assert_eq!(preset("harmonic").unwrap(), OscillatorModel::default());
        assert_eq!(
            preset("pocket_benchmark").unwrap(),
            OscillatorModel::pocket_benchmark()
        );
        assert!(preset("duffing").is_err());
    }

    #[test]
    fn test_derived_scales() {
        let model = OscillatorModel::default();
        assert!((natural_frequency(&model, 1.0) - 1.0).abs() < 1e-12);
        assert!((leapfrog_stability_limit(&model, 1.0) - 2.0).abs() < 1e-12);
        let bench = OscillatorModel::pocket_benchmark();
        assert!(leapfrog_stability_limit(&bench, 0.35) > 0.016);
    }

    #[test]
    fn test_euler_damping_limit() {
        let bench = OscillatorModel::pocket_benchmark();
        assert!((euler_damping_limit(&bench) - 2.0 / 1720.0).abs() < 1e-15);
        assert!(euler_damping_limit(&bench) < 0.0022);
        assert_eq!(euler_damping_limit(&OscillatorModel::default()), f64::INFINITY);
    }
}
