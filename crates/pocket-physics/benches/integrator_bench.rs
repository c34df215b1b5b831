// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Integrator Benchmarks
// ─────────────────────────────────────────────────────────────────────

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pocket_physics::{execute, Integrator, NoiseSource, OscillatorState};
use pocket_types::{NoiseConfig, OscillatorModel, RunConfig, Scheme};

// ── Integrator::step() ──────────────────────────────────────────────

fn bench_leapfrog_step(c: &mut Criterion) {
    let integ = Integrator::new(Scheme::Leapfrog, OscillatorModel::pocket_benchmark())
        .expect("valid model");
    let mut noise = NoiseSource::new(NoiseConfig::gradient(0.2), 0).expect("valid noise");
    let mut state = OscillatorState::new(0.0, 0.0, 0.35).expect("valid state");
    c.bench_function("leapfrog_step_gradient_noise", |b| {
        b.iter(|| integ.step(&mut state, black_box(0.0025), &mut noise))
    });
}

fn bench_euler_step(c: &mut Criterion) {
    let integ = Integrator::new(Scheme::Euler, OscillatorModel::default()).expect("valid model");
    let mut noise = NoiseSource::silent();
    let mut state = OscillatorState::new(0.1, 0.0, 1.0).expect("valid state");
    c.bench_function("euler_step_silent", |b| {
        b.iter(|| integ.step(&mut state, black_box(1e-4), &mut noise))
    });
}

// ── Full 1000-step run ──────────────────────────────────────────────

fn bench_run_1000_steps(c: &mut Criterion) {
    let config = RunConfig {
        model: OscillatorModel::pocket_benchmark(),
        noise: NoiseConfig::gradient(0.2),
        dt: 0.0025,
        ..Default::default()
    };
    c.bench_function("run_1000_steps", |b| {
        b.iter(|| execute(black_box(config.clone())))
    });
}

fn bench_run_1000_steps_capped(c: &mut Criterion) {
    let config = RunConfig {
        noise: NoiseConfig::new(pocket_types::NoiseChannel::Momentum, 0.05),
        energy_cap: Some(1e-4),
        ..Default::default()
    };
    c.bench_function("run_1000_steps_capped", |b| {
        b.iter(|| execute(black_box(config.clone())))
    });
}

criterion_group!(
    benches,
    bench_leapfrog_step,
    bench_euler_step,
    bench_run_1000_steps,
    bench_run_1000_steps_capped,
);
criterion_main!(benches);
