// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Time-Reversibility Check
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use pocket_types::{OscillatorModel, PocketResult, Scheme};

use crate::integrator::{Integrator, OscillatorState};
use crate::noise::NoiseSource;

/// Round-trip errors for both schemes at one `(dt, k)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReversibilityReport {
    pub k: usize,
    pub dt: f64,
    pub normalized_rt_error_leapfrog: f64,
    pub normalized_rt_error_euler: f64,
}

/// Run `k` noiseless steps forward and `k` back, then return
/// `‖(q, p) − (q0, p0)‖ / ‖(q0, p0)‖`.
///
/// Can be `inf` when the forward leg blows up.
pub fn round_trip_error(
    scheme: Scheme,
    model: &OscillatorModel,
    mass: f64,
    dt: f64,
    k: usize,
) -> PocketResult<f64> {
    let integrator = Integrator::new(scheme, *model)?;
    let start = OscillatorState::new(model.initial_q, model.initial_p, mass)?;
    let mut state = start;
    let mut noise = NoiseSource::silent();
    for _ in 0..k {
        integrator.step(&mut state, dt, &mut noise)?;
    }
    for _ in 0..k {
        integrator.step_backward(&mut state, dt, &mut noise)?;
    }
    let err = (state.q - start.q).hypot(state.p - start.p);
    Ok(err / start.phase_norm().max(f64::MIN_POSITIVE))
}

pub fn reversibility_report(
    model: &OscillatorModel,
    mass: f64,
    dt: f64,
    k: usize,
) -> PocketResult<ReversibilityReport> {
    let leapfrog = round_trip_error(Scheme::Leapfrog, model, mass, dt, k)?;
    let euler = round_trip_error(Scheme::Euler, model, mass, dt, k)?;
    log::debug!("reversibility k={k} dt={dt}: leapfrog={leapfrog:e} euler={euler:e}");
    Ok(ReversibilityReport {
        k,
        dt,
        normalized_rt_error_leapfrog: leapfrog,
        normalized_rt_error_euler: euler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leapfrog_round_trip_machine_precision() {
        let model = OscillatorModel::default();
        let err = round_trip_error(Scheme::Leapfrog, &model, 1.0, 0.01, 1000).unwrap();
        assert!(err < 1e-9, "leapfrog rt error = {err:e}");
    }

    #[test]
    fn test_euler_orders_of_magnitude_worse() {
        let report = reversibility_report(&OscillatorModel::default(), 1.0, 0.01, 1000).unwrap();
        let leap = report.normalized_rt_error_leapfrog;
        let euler = report.normalized_rt_error_euler;
        assert!(euler > 1e-3, "euler rt error = {euler:e}");
        assert!(euler > 1e3 * leap.max(1e-16), "euler={euler:e} leapfrog={leap:e}");
    }

    #[test]
    fn test_damped_model_still_reversible_under_leapfrog() {
        let model = OscillatorModel {
            stiffness: 0.75,
            damping: 3.2,
            drive: 10.0,
            initial_q: 13.4,
            initial_p: 0.5,
            initial_jitter: 0.0,
        };
        let err = round_trip_error(Scheme::Leapfrog, &model, 0.35, 0.0025, 200).unwrap();
        assert!(err < 1e-9, "rt error = {err:e}");
    }

    #[test]
    fn test_report_serialises_expected_keys() {
        let report = reversibility_report(&OscillatorModel::default(), 1.0, 0.01, 10).unwrap();
        let json = serde_json::to_value(report).unwrap();
        for key in ["k", "dt", "normalized_rt_error_leapfrog", "normalized_rt_error_euler"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_invalid_dt_rejected() {
        assert!(reversibility_report(&OscillatorModel::default(), 1.0, 0.0, 10).is_err());
    }
}
