// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Oscillator Integrator
// ─────────────────────────────────────────────────────────────────────
//! Single-step integrators for the damped, driven oscillator:
//!
//!   dq/dt = p/m
//!   dp/dt = F − k·q − γ·p − σξ      (σξ only on the gradient channel)
//!
//! Leapfrog treats damping as a conformal factor `e^{−γ·dt/2}` on both
//! ends of the kick-drift-kick sequence, so a step run with `−dt` undoes
//! it exactly (up to rounding). Euler is the synchronous explicit update.
//!
//! Every step also reports the work the non-conservative forces did on the
//! oscillator, integrated with the trapezoid rule in `p`:
//!
//!   W = dt·[(F − σξ)·(p₀ + p₁) − γ·(p₀² + p₁²)] / (2m)
//!
//! For the exact flow `H(t) − H(0) − ΣW → 0` as dt → 0, so whatever the
//! run executor accumulates on top of it is discretisation error.

use serde::{Deserialize, Serialize};

use pocket_types::error::ensure_positive;
use pocket_types::{NoiseChannel, OscillatorModel, PocketError, PocketResult, Scheme};

use crate::noise::NoiseSource;

/// Phase-space state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillatorState {
    pub q: f64,
    pub p: f64,
    /// Mass (> 0).
    pub m: f64,
    pub t: f64,
}

impl OscillatorState {
    pub fn new(q: f64, p: f64, m: f64) -> PocketResult<Self> {
        ensure_positive("mass", m)?;
        if !q.is_finite() || !p.is_finite() {
            return Err(PocketError::InvalidParameter(format!(
                "initial state must be finite, got q={q} p={p}"
            )));
        }
        Ok(Self { q, p, m, t: 0.0 })
    }

    /// Euclidean norm of `(q, p)`.
    pub fn phase_norm(&self) -> f64 {
        self.q.hypot(self.p)
    }
}

/// Energy bookkeeping of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEnergy {
    /// Hamiltonian after the step.
    pub h: f64,
    /// Work done by drive, damping and gradient noise during the step.
    /// Position and momentum kicks are not forces and are not counted.
    pub work: f64,
}

pub struct Integrator {
    scheme: Scheme,
    model: OscillatorModel,
}

impl Integrator {
    pub fn new(scheme: Scheme, model: OscillatorModel) -> PocketResult<Self> {
        model.validate()?;
        Ok(Self { scheme, model })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn model(&self) -> &OscillatorModel {
        &self.model
    }

    /// `H = p²/(2m) + ½·k·q²`.
    #[inline]
    pub fn hamiltonian(&self, state: &OscillatorState) -> f64 {
        state.p * state.p / (2.0 * state.m) + self.potential(state.q)
    }

    #[inline]
    pub fn potential(&self, q: f64) -> f64 {
        0.5 * self.model.stiffness * q * q
    }

    /// Advance `state` by one step of size `dt` and return the new `H`.
    ///
    /// Consumes exactly one draw from `noise` when its channel is active.
    /// A non-finite `H` is returned as is; the caller decides whether that
    /// counts as divergence.
    pub fn step(
        &self,
        state: &mut OscillatorState,
        dt: f64,
        noise: &mut NoiseSource,
    ) -> PocketResult<f64> {
        self.step_energy(state, dt, noise).map(|e| e.h)
    }

    /// Same as [`Integrator::step`], also returning the step's external work.
    pub fn step_energy(
        &self,
        state: &mut OscillatorState,
        dt: f64,
        noise: &mut NoiseSource,
    ) -> PocketResult<StepEnergy> {
        ensure_positive("dt", dt)?;
        ensure_positive("mass", state.m)?;
        let work = self.advance(state, dt, noise);
        Ok(StepEnergy { h: self.hamiltonian(state), work })
    }

    /// Undo one noiseless step of size `dt` by stepping with `−dt`.
    pub fn step_backward(
        &self,
        state: &mut OscillatorState,
        dt: f64,
        noise: &mut NoiseSource,
    ) -> PocketResult<f64> {
        ensure_positive("dt", dt)?;
        ensure_positive("mass", state.m)?;
        self.advance(state, -dt, noise);
        Ok(self.hamiltonian(state))
    }

    /// Returns the external work of the step.
    fn advance(&self, state: &mut OscillatorState, h: f64, noise: &mut NoiseSource) -> f64 {
        let xi = noise.draw();
        let gradient_noise = if noise.channel() == NoiseChannel::Gradient { xi } else { 0.0 };
        let k = self.model.stiffness;
        let f = self.model.drive;
        let gamma = self.model.damping;
        let p_start = state.p;

        match self.scheme {
            Scheme::Leapfrog => {
                let damp = (-gamma * h * 0.5).exp();
                state.p *= damp;
                state.p += 0.5 * h * (f - k * state.q - gradient_noise);
                state.q += h * state.p / state.m;
                state.p += 0.5 * h * (f - k * state.q - gradient_noise);
                state.p *= damp;
            }
            Scheme::Euler => {
                let force = f - k * state.q - gradient_noise - gamma * state.p;
                let q_next = state.q + h * state.p / state.m;
                let p_next = state.p + h * force;
                state.q = q_next;
                state.p = p_next;
            }
        }
        let p_end = state.p;
        let work = h
            * ((f - gradient_noise) * (p_start + p_end)
                - gamma * (p_start * p_start + p_end * p_end))
            / (2.0 * state.m);

        match noise.channel() {
            NoiseChannel::Position => state.q += xi,
            NoiseChannel::Momentum => state.p += xi,
            NoiseChannel::Gradient | NoiseChannel::None => {}
        }
        state.t += h;
        work
    }
}
