// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — End-to-End Scenarios
// ─────────────────────────────────────────────────────────────────────

use pocket_core::{Aggregator, BoundaryFinder, CancelHandle};
use pocket_physics::{execute, reversibility_report};
use pocket_types::{
    DriftSign, EnsembleConfig, NoiseConfig, OscillatorModel, Scheme, SearchConfig,
    TerminationReason, TrialPhase,
};

fn pocket_ensemble() -> EnsembleConfig {
    EnsembleConfig {
        scheme: Scheme::Leapfrog,
        mass: 0.35,
        steps: 1000,
        noise: NoiseConfig::gradient(0.20),
        epsilon: 1e-6,
        model: OscillatorModel::pocket_benchmark(),
        ..EnsembleConfig::default().with_seed_count(20)
    }
}

fn search(lo: f64, hi: f64) -> SearchConfig {
    SearchConfig {
        lo,
        hi,
        tolerance: 1e-5,
        scan_budget: 8,
        max_trials: 40,
        ..SearchConfig::default()
    }
}

#[test]
fn test_scenario_energy_conservation_without_noise() {
    let ensemble = EnsembleConfig { noise: NoiseConfig::default(), ..pocket_ensemble() };
    let outcome = execute(ensemble.run_config(0.003, 0)).unwrap();
    assert_eq!(outcome.trace.len(), 1001);
    let max = outcome.trace.max_abs_drift();
    assert!(max < 1e-6, "max |ΔH| = {max:e}");

    let aggregate = Aggregator::new(ensemble)
        .unwrap()
        .aggregate(0.003, &CancelHandle::new())
        .unwrap();
    assert!(aggregate.tail_mean.abs() < 1e-6, "tail mean = {:e}", aggregate.tail_mean);
    assert_ne!(aggregate.sign, DriftSign::Dissipative);
}

#[test]
fn test_scenario_converges_inside_bracket() {
    let aggregator = Aggregator::new(pocket_ensemble()).unwrap();
    let finder = BoundaryFinder::new(aggregator, search(0.0022, 0.0028)).unwrap();
    let mut run = finder.search();
    let mut previous: Option<(f64, f64)> = None;
    while let Some(trial) = run.next() {
        let bracket = run.bracket();
        if trial.phase == TrialPhase::Bisect {
            let (lo, hi) = bracket.unwrap();
            if let Some((plo, phi)) = previous {
                assert!(lo >= plo && hi <= phi, "[{lo}, {hi}] not nested in [{plo}, {phi}]");
                assert!(hi - lo < phi - plo, "bracket did not shrink at dt={}", trial.dt);
            }
        }
        previous = bracket;
    }
    let estimate = run.finish().unwrap();

    assert_eq!(estimate.reason, TerminationReason::Converged);
    let dt_star = estimate.require_converged().unwrap();
    assert!((0.0022..=0.0028).contains(&dt_star), "dt* = {dt_star}");
    assert!(estimate.width() <= 1e-5, "width = {}", estimate.width());
    assert!(estimate.lo <= dt_star && dt_star <= estimate.hi);

    let trials = finder.trial_log().snapshot();
    assert_eq!(trials.len(), estimate.trials);
    assert_eq!(trials[0].aggregate_sign, DriftSign::AntiDissipative);
    assert_eq!(trials[1].aggregate_sign, DriftSign::Dissipative);
    assert!(trials.iter().skip(2).all(|t| t.phase == TrialPhase::Bisect));
    assert!(trials.iter().all(|t| t.seeds.len() == 20 && t.divergent_seeds.is_empty()));
}

#[test]
fn test_boundary_independent_of_step_count() {
    let dt_star = |steps: usize| {
        let aggregator = Aggregator::new(EnsembleConfig { steps, ..pocket_ensemble() }).unwrap();
        BoundaryFinder::new(aggregator, search(0.0022, 0.0028))
            .unwrap()
            .run()
            .unwrap()
            .require_converged()
            .unwrap()
    };
    let short = dt_star(500);
    let long = dt_star(2000);
    // A relaxation transient would put dt*·steps at a constant instead.
    assert!((short - long).abs() < 2e-4, "dt*(500) = {short}, dt*(2000) = {long}");
    assert!((0.0024..=0.0026).contains(&short), "dt*(500) = {short}");
}

#[test]
fn test_schemes_give_distinguishable_signals() {
    let cancel = CancelHandle::new();
    let leapfrog = Aggregator::new(pocket_ensemble()).unwrap();
    let euler =
        Aggregator::new(EnsembleConfig { scheme: Scheme::Euler, ..pocket_ensemble() }).unwrap();

    let leap_small = leapfrog.aggregate(0.001, &cancel).unwrap();
    let euler_small = euler.aggregate(0.001, &cancel).unwrap();
    assert_eq!(leap_small.sign, DriftSign::AntiDissipative);
    assert_eq!(euler_small.sign, DriftSign::AntiDissipative);
    assert!(
        euler_small.tail_mean > 10.0 * leap_small.tail_mean,
        "euler = {:e}, leapfrog = {:e}",
        euler_small.tail_mean,
        leap_small.tail_mean
    );

    // Past γ·dt = 2 Euler amplifies momentum; leapfrog still resolves a sign.
    let leap_pocket = leapfrog.aggregate(0.0028, &cancel).unwrap();
    let euler_pocket = euler.aggregate(0.0028, &cancel).unwrap();
    assert_eq!(leap_pocket.sign, DriftSign::Dissipative);
    assert_eq!(euler_pocket.sign, DriftSign::Inconclusive);
    assert_eq!(euler_pocket.divergent_seeds.len(), 20);
}

#[test]
fn test_scenario_no_bracket_in_dissipative_range() {
    let aggregator = Aggregator::new(pocket_ensemble()).unwrap();
    let finder = BoundaryFinder::new(aggregator, search(0.006, 0.016)).unwrap();
    let estimate = finder.run().unwrap();

    assert_eq!(estimate.reason, TerminationReason::NoBracketFound);
    assert!(estimate.dt_star.is_none());
    assert_eq!(estimate.trials, 2 + 8);

    let trials = finder.trial_log().snapshot();
    assert_eq!(trials[0].aggregate_sign, DriftSign::Dissipative);
    assert_eq!(trials[1].aggregate_sign, DriftSign::Dissipative);
    assert!(trials.iter().all(|t| t.aggregate_sign != DriftSign::AntiDissipative));
}

#[test]
fn test_aggregate_reproducible_and_permutation_invariant() {
    let cancel = CancelHandle::new();
    let forward = Aggregator::new(pocket_ensemble()).unwrap();
    let mut shuffled_cfg = pocket_ensemble();
    shuffled_cfg.seeds = vec![7, 19, 0, 3, 12, 1, 18, 5, 9, 2, 14, 4, 16, 6, 11, 8, 13, 10, 17, 15];
    let shuffled = Aggregator::new(shuffled_cfg).unwrap();

    let a = forward.aggregate(0.0025, &cancel).unwrap();
    let b = forward.aggregate(0.0025, &cancel).unwrap();
    let c = shuffled.aggregate(0.0025, &cancel).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(a.tail_mean.to_bits(), c.tail_mean.to_bits());
}

#[test]
fn test_reversibility_leapfrog_vs_euler() {
    let report = reversibility_report(&OscillatorModel::default(), 1.0, 0.01, 1000).unwrap();
    assert!(
        report.normalized_rt_error_leapfrog < 1e-9,
        "leapfrog = {:e}",
        report.normalized_rt_error_leapfrog
    );
    assert!(
        report.normalized_rt_error_euler > 1e3 * report.normalized_rt_error_leapfrog.max(1e-16),
        "euler = {:e}",
        report.normalized_rt_error_euler
    );
}

#[test]
fn test_trials_readable_while_search_runs() {
    let aggregator = Aggregator::new(pocket_ensemble().with_seed_count(4)).unwrap();
    let finder = BoundaryFinder::new(aggregator, search(0.0022, 0.0028)).unwrap();
    let log = finder.trial_log();
    let mut search = finder.search();
    let mut cursor = log.cursor(0);
    while let Some(produced) = search.next() {
        let seen = cursor.next().unwrap();
        assert_eq!(seen.index, produced.index);
        assert_eq!(*seen, *produced);
    }
    assert!(cursor.next().is_none());
    assert!(search.outcome().is_some());
}
