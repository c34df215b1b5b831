// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Run Executor
// ─────────────────────────────────────────────────────────────────────
//! Drives the integrator for one `(dt, seed)` pair and produces the
//! energy drift trace.
//!
//! The drift is the energy residual `R = H − W`, with `W` the accumulated
//! work of drive, damping and gradient noise, taken relative to its value
//! at the baseline step. The exact flow keeps `R` constant, so `ΔH` in the
//! trace is discretisation and noise-injection drift only.
//!
//! Samples are pulled one step at a time through [`TraceStream`]; the
//! first `baseline_step + 1` samples are computed up front because every
//! `ΔH` is relative to the baseline.

use std::collections::VecDeque;

use pocket_types::{EnergyTrace, PocketError, PocketResult, RunConfig, Scheme, TracePoint};

use crate::integrator::{Integrator, OscillatorState};
use crate::noise::NoiseSource;
use crate::params::{euler_damping_limit, leapfrog_stability_limit};

/// One pulled sample: the drift point and whether the cap clamped it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSample {
    pub point: TracePoint,
    pub capped: bool,
}

/// Completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub trace: EnergyTrace,
    /// Per-sample cap engagement, aligned with `trace.points`.
    pub cap_flags: Vec<bool>,
    pub final_state: OscillatorState,
}

impl RunOutcome {
    /// Flagged steps divided by the step count.
    pub fn cap_engagement_fraction(&self) -> f64 {
        let steps = self.trace.len().saturating_sub(1);
        if steps == 0 {
            return 0.0;
        }
        self.cap_flags.iter().filter(|&&c| c).count() as f64 / steps as f64
    }
}

pub struct RunExecutor {
    config: RunConfig,
    integrator: Integrator,
}

impl RunExecutor {
    pub fn new(config: RunConfig) -> PocketResult<Self> {
        config.validate()?;
        let integrator = Integrator::new(config.scheme, config.model)?;
        let limit = leapfrog_stability_limit(&config.model, config.mass);
        if config.dt > limit {
            log::warn!(
                "dt={} exceeds the undamped stability limit {limit:.4}; expect divergence",
                config.dt
            );
        }
        if config.scheme == Scheme::Euler && config.dt > euler_damping_limit(&config.model) {
            log::warn!(
                "dt={} exceeds the Euler damping limit {:.3e}; expect divergence",
                config.dt,
                euler_damping_limit(&config.model)
            );
        }
        Ok(Self { config, integrator })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Pull-based trace. Fails early if the run diverges before the
    /// baseline step.
    pub fn stream(&self) -> PocketResult<TraceStream<'_>> {
        TraceStream::start(self)
    }

    /// Run to completion.
    pub fn execute(&self) -> PocketResult<RunOutcome> {
        let mut stream = self.stream()?;
        let mut points = Vec::with_capacity(self.config.steps + 1);
        let mut cap_flags = Vec::with_capacity(self.config.steps + 1);
        for sample in stream.by_ref() {
            let sample = sample?;
            points.push(sample.point);
            cap_flags.push(sample.capped);
        }
        Ok(RunOutcome {
            trace: EnergyTrace {
                h0: stream.h0,
                baseline_step: self.config.baseline_step,
                points,
            },
            cap_flags,
            final_state: stream.state,
        })
    }
}

/// Convenience: validate, run and collect.
pub fn execute(config: RunConfig) -> PocketResult<RunOutcome> {
    RunExecutor::new(config)?.execute()
}

/// Raw sample computed before the baseline was known.
#[derive(Debug, Clone, Copy)]
struct RawSample {
    step: usize,
    t: f64,
    h: f64,
    /// `H − W` at this step.
    residual: f64,
}

/// Iterator over `(t, H, ΔH)` samples of one run, step 0 first.
///
/// Yields `Err(NumericDivergence)` once and then ends.
pub struct TraceStream<'a> {
    executor: &'a RunExecutor,
    state: OscillatorState,
    noise: NoiseSource,
    /// `H` at the baseline step.
    h0: f64,
    /// `H − W` at the baseline step.
    reference: f64,
    /// External work accumulated since step 0.
    work: f64,
    pending: VecDeque<RawSample>,
    step: usize,
    done: bool,
}

impl<'a> TraceStream<'a> {
    fn start(executor: &'a RunExecutor) -> PocketResult<Self> {
        let cfg = &executor.config;
        let mut noise = NoiseSource::new(cfg.noise, cfg.seed)?;
        let model = &cfg.model;
        let mut q0 = model.initial_q;
        if model.initial_jitter > 0.0 {
            q0 += model.initial_jitter * noise.standard_normal();
        }
        let state = OscillatorState::new(q0, model.initial_p, cfg.mass)?;

        let mut stream = Self {
            executor,
            state,
            noise,
            h0: 0.0,
            reference: 0.0,
            work: 0.0,
            pending: VecDeque::with_capacity(cfg.baseline_step + 1),
            step: 0,
            done: false,
        };

        let h = stream.executor.integrator.hamiltonian(&stream.state);
        stream.check_finite(h)?;
        let first = stream.raw(h);
        stream.pending.push_back(first);
        while stream.step < cfg.baseline_step {
            let h = stream.advance()?;
            let sample = stream.raw(h);
            stream.pending.push_back(sample);
        }
        if let Some(base) = stream.pending.back() {
            stream.h0 = base.h;
            stream.reference = base.residual;
        }
        Ok(stream)
    }

    fn raw(&self, h: f64) -> RawSample {
        RawSample {
            step: self.step,
            t: self.state.t,
            h,
            residual: h - self.work,
        }
    }

    fn advance(&mut self) -> PocketResult<f64> {
        let energy = self.executor.integrator.step_energy(
            &mut self.state,
            self.executor.config.dt,
            &mut self.noise,
        )?;
        self.step += 1;
        self.work += energy.work;
        self.check_finite(energy.h)?;
        Ok(energy.h)
    }

    fn check_finite(&self, h: f64) -> PocketResult<()> {
        if h.is_finite()
            && self.work.is_finite()
            && self.state.q.is_finite()
            && self.state.p.is_finite()
        {
            return Ok(());
        }
        let cfg = &self.executor.config;
        log::warn!(
            "seed={} dt={}: numeric divergence at step {} (H={h})",
            cfg.seed,
            cfg.dt,
            self.step
        );
        Err(PocketError::NumericDivergence {
            step: self.step,
            t: self.state.t,
            h,
        })
    }

    /// Energy the exact flow would have at the current step.
    fn expected_energy(&self) -> f64 {
        self.reference + self.work
    }

    /// Clamp the state back onto `expected ± cap`, momentum first. Returns
    /// the Hamiltonian after clamping.
    fn clamp_to_cap(&mut self, h: f64, cap: f64) -> f64 {
        let expected = self.expected_energy();
        let integ = &self.executor.integrator;
        let bound = if h > expected { expected + cap } else { expected - cap };
        let target = bound.max(0.0);
        let potential = integ.potential(self.state.q);
        if target >= potential {
            let sign = if self.state.p < 0.0 { -1.0 } else { 1.0 };
            self.state.p = sign * (2.0 * self.state.m * (target - potential)).sqrt();
        } else {
            let sign = if self.state.q < 0.0 { -1.0 } else { 1.0 };
            self.state.p = 0.0;
            self.state.q = sign * (2.0 * target / integ.model().stiffness).sqrt();
        }
        integ.hamiltonian(&self.state)
    }
}

impl Iterator for TraceStream<'_> {
    type Item = PocketResult<TraceSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(raw) = self.pending.pop_front() {
            return Some(Ok(TraceSample {
                point: TracePoint {
                    step: raw.step,
                    t: raw.t,
                    h: raw.h,
                    delta_h: raw.residual - self.reference,
                },
                capped: false,
            }));
        }
        if self.step >= self.executor.config.steps {
            self.done = true;
            return None;
        }
        let mut h = match self.advance() {
            Ok(h) => h,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let mut capped = false;
        if let Some(cap) = self.executor.config.energy_cap {
            if (h - self.expected_energy()).abs() > cap {
                h = self.clamp_to_cap(h, cap);
                capped = true;
                log::trace!("step {}: energy cap engaged, H clamped to {h}", self.step);
            }
        }
        Some(Ok(TraceSample {
            point: TracePoint {
                step: self.step,
                t: self.state.t,
                h,
                delta_h: h - self.expected_energy(),
            },
            capped,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.pending.len() + self.executor.config.steps - self.step;
        (0, Some(remaining))
    }
}
