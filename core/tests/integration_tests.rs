//! End-to-end tests for the landmark particle filter.
//!
//! These tests drive the public API the way a localization loop would: initialize from a rough
//! pose, then predict, update and resample on every tick. Synthetic scenarios come from
//! `landmark_pf::sim`, so the ground truth is known exactly.
//!
//! The error bounds used below are not theoretical guarantees. They were chosen with comfortable
//! margin over what the filter achieves on these scenarios and serve as regression checks.
use assert_approx_eq::assert_approx_eq;
use std::f64::consts::PI;

use landmark_pf::config::{ConfigFile, FilterConfig};
use landmark_pf::map::{Landmark, LandmarkMap};
use landmark_pf::measurements::Observation;
use landmark_pf::motion::{MotionInput, propagate};
use landmark_pf::particle::{ParticleAveragingStrategy, SenseAxis};
use landmark_pf::resampling::ParticleResamplingStrategy;
use landmark_pf::sim::{
    SimulationConfig, StepResult, generate_scenario, rms_errors, run_simulation,
};
use landmark_pf::{FilterError, FilterPhase, ParticleFilter, Pose, wrap_to_pi};

fn scenario_config(steps: usize, particles: usize, seed: u64) -> SimulationConfig {
    SimulationConfig {
        steps,
        filter: FilterConfig {
            num_particles: particles,
            seed: Some(seed),
            ..FilterConfig::default()
        },
        ..SimulationConfig::default()
    }
}

#[test]
fn test_single_particle_single_landmark() {
    let mut pf = ParticleFilter::with_seed(1, 0).unwrap();
    let map = LandmarkMap::new(vec![Landmark::new(1, 5.0, 3.0)]).unwrap();
    pf.init(0.0, 0.0, 0.0, &[0.0; 3]).unwrap();
    pf.update_weights(50.0, &[0.3, 0.3], &[Observation::new(5.0, 3.0)], &map)
        .unwrap();

    let particle = &pf.particles()[0];
    assert_approx_eq!(particle.weight, 1.0 / (2.0 * PI * 0.3 * 0.3), 1e-9);
    assert_eq!(particle.associations(), &[1]);
    assert_eq!(particle.associations_string(), "1");
    assert_eq!(particle.sense_coord_string(SenseAxis::X), "5");
    assert_eq!(particle.sense_coord_string(SenseAxis::Y), "3");

    pf.resample().unwrap();
    assert_eq!(pf.particles().len(), 1);
    assert_eq!(pf.phase(), FilterPhase::Resampled);
}

#[test]
fn test_population_size_is_constant() {
    let config = scenario_config(30, 37, 4);
    let scenario = generate_scenario(&config).unwrap();
    let mut pf = ParticleFilter::new(config.filter.clone()).unwrap();
    let first = &scenario.ticks[0];
    pf.init(first.gps.x, first.gps.y, first.gps.theta, &config.init_std)
        .unwrap();
    assert_eq!(pf.particles().len(), 37);
    for tick in &scenario.ticks[1..] {
        pf.predict(
            config.delta_t,
            &config.process_std,
            tick.control.velocity,
            tick.control.yaw_rate,
        )
        .unwrap();
        assert_eq!(pf.particles().len(), 37);
        pf.update_weights(
            config.sensor_range,
            &config.landmark_std,
            &tick.observations,
            &scenario.map,
        )
        .unwrap();
        assert_eq!(pf.particles().len(), 37);
        pf.resample().unwrap();
        assert_eq!(pf.particles().len(), 37);
    }
}

#[test]
fn test_filter_tracks_circular_drive() {
    let config = scenario_config(300, 100, 21);
    let scenario = generate_scenario(&config).unwrap();
    let results = run_simulation(&config, &scenario).unwrap();
    assert_eq!(results.len(), 300);
    let (position, heading) = rms_errors(&results).unwrap();
    assert!(position < 1.0, "RMS position error {position}");
    assert!(heading < 0.05, "RMS heading error {heading}");
    let worst = results
        .iter()
        .map(|r| r.position_error)
        .fold(0.0, f64::max);
    assert!(worst < 3.0, "worst position error {worst}");
}

#[test]
fn test_every_strategy_tracks() {
    let config = scenario_config(150, 100, 8);
    let scenario = generate_scenario(&config).unwrap();
    for resampling_strategy in [
        ParticleResamplingStrategy::Wheel,
        ParticleResamplingStrategy::Systematic,
        ParticleResamplingStrategy::Multinomial,
    ] {
        for averaging_strategy in [
            ParticleAveragingStrategy::HighestWeight,
            ParticleAveragingStrategy::WeightedAverage,
            ParticleAveragingStrategy::UnweightedAverage,
        ] {
            let mut config = config.clone();
            config.filter.resampling_strategy = resampling_strategy;
            config.filter.averaging_strategy = averaging_strategy;
            let results = run_simulation(&config, &scenario).unwrap();
            let (position, _) = rms_errors(&results).unwrap();
            assert!(
                position < 1.0,
                "{resampling_strategy:?}/{averaging_strategy:?}: RMS position error {position}"
            );
        }
    }
}

#[test]
fn test_filter_outperforms_dead_reckoning() {
    let config = SimulationConfig {
        control_std: [0.5, 0.05],
        ..scenario_config(300, 100, 12)
    };
    let scenario = generate_scenario(&config).unwrap();
    let results = run_simulation(&config, &scenario).unwrap();
    let (filter_error, _) = rms_errors(&results).unwrap();

    let mut pose = scenario.ticks[0].gps;
    let mut dr_sum = 0.0;
    for (step, tick) in scenario.ticks.iter().enumerate() {
        if step > 0 {
            pose = propagate(pose, &tick.control);
        }
        dr_sum += pose.distance(&tick.truth).powi(2);
    }
    let dr_error = (dr_sum / scenario.ticks.len() as f64).sqrt();
    assert!(
        filter_error < dr_error,
        "filter {filter_error} vs dead reckoning {dr_error}"
    );
}

#[test]
fn test_serial_and_parallel_agree() {
    let serial = SimulationConfig {
        filter: FilterConfig {
            parallel: false,
            ..scenario_config(60, 80, 31).filter
        },
        ..scenario_config(60, 80, 31)
    };
    let parallel = scenario_config(60, 80, 31);
    let scenario = generate_scenario(&serial).unwrap();
    assert_eq!(
        run_simulation(&serial, &scenario).unwrap(),
        run_simulation(&parallel, &scenario).unwrap()
    );
}

#[test]
fn test_same_seed_same_particles() {
    let map = LandmarkMap::new(vec![
        Landmark::new(1, 10.0, 0.0),
        Landmark::new(2, 0.0, 10.0),
        Landmark::new(3, -10.0, -10.0),
    ])
    .unwrap();
    let observations = [Observation::new(10.1, 0.2), Observation::new(-0.3, 9.8)];
    let run = |seed: u64| {
        let mut pf = ParticleFilter::with_seed(25, seed).unwrap();
        pf.init(0.0, 0.0, 0.0, &[0.5, 0.5, 0.05]).unwrap();
        for _ in 0..5 {
            pf.update_weights(30.0, &[0.4, 0.4], &observations, &map)
                .unwrap();
            pf.resample().unwrap();
            pf.predict(0.1, &[0.1, 0.1, 0.01], 0.0, 0.0).unwrap();
        }
        pf.particles().to_vec()
    };
    assert_eq!(run(5), run(5));
    assert_ne!(run(5), run(6));
}

#[test]
fn test_uniform_weights_resample_uniformly() {
    let n = 10;
    let trials = 8000;
    // Multinomial draws are independent, so the 1% critical value at 9 degrees of freedom
    // applies. Draws within one wheel pass are correlated and its statistic runs higher: over
    // 300 seeded runs of 4000 passes it peaked near 73.
    for (strategy, bound) in [
        (ParticleResamplingStrategy::Wheel, 100.0),
        (ParticleResamplingStrategy::Multinomial, 21.67),
    ] {
        let mut pf = ParticleFilter::new(FilterConfig {
            num_particles: n,
            seed: Some(77),
            resampling_strategy: strategy,
            ..FilterConfig::default()
        })
        .unwrap();
        let map = LandmarkMap::default();
        let mut counts = vec![0usize; n];
        for _ in 0..trials {
            pf.init(0.0, 0.0, 0.0, &[1.0, 1.0, 0.1]).unwrap();
            // No observations leaves every weight at one
            pf.update_weights(10.0, &[0.3, 0.3], &[], &map).unwrap();
            pf.resample().unwrap();
            for p in pf.particles() {
                counts[p.id] += 1;
            }
        }
        let expected = trials as f64;
        let chi_square: f64 = counts
            .iter()
            .map(|o| (*o as f64 - expected).powi(2) / expected)
            .sum();
        assert!(
            chi_square < bound,
            "{strategy:?}: chi-square {chi_square}: {counts:?}"
        );
        for o in &counts {
            assert!(
                (*o as f64 - expected).abs() / expected < 0.1,
                "{strategy:?}: {counts:?}"
            );
        }
    }
}

#[test]
fn test_many_sharp_observations_do_not_stall_the_filter() {
    let map = LandmarkMap::new(vec![Landmark::new(1, 5.0, 3.0)]).unwrap();
    let observations = vec![Observation::new(5.0, 3.0); 120];
    let mut pf = ParticleFilter::with_seed(10, 0).unwrap();
    pf.init(0.0, 0.0, 0.0, &[0.0; 3]).unwrap();
    pf.update_weights(50.0, &[0.01, 0.01], &observations, &map)
        .unwrap();
    assert_eq!(pf.phase(), FilterPhase::Weighted);
    assert!(pf.max_weight().is_finite());
    pf.resample().unwrap();
    pf.predict(0.1, &[0.0; 3], 0.0, 0.0).unwrap();
    pf.update_weights(50.0, &[0.01, 0.01], &observations, &map)
        .unwrap();
    pf.resample().unwrap();
    assert_eq!(pf.particles().len(), 10);
    assert_eq!(pf.best_particle().unwrap().associations().len(), 120);
}

#[test]
fn test_degenerate_update_and_recovery() {
    let mut pf = ParticleFilter::with_seed(20, 3).unwrap();
    let map = LandmarkMap::new(vec![Landmark::new(1, 0.0, 0.0)]).unwrap();
    pf.init(0.0, 0.0, 0.0, &[0.1, 0.1, 0.01]).unwrap();
    // A landmark seen a kilometre away from the only one on the map
    let far = [Observation::new(1000.0, 1000.0)];
    assert_eq!(
        pf.update_weights(2000.0, &[0.1, 0.1], &far, &map),
        Err(FilterError::DegenerateWeights)
    );
    assert_eq!(pf.phase(), FilterPhase::Degenerate);
    assert!(matches!(
        pf.resample(),
        Err(FilterError::OutOfSequence { .. })
    ));
    pf.inject_weight_floor(1e-300).unwrap();
    pf.resample().unwrap();
    assert_eq!(pf.particles().len(), 20);
    assert_eq!(pf.phase(), FilterPhase::Resampled);
}

#[test]
fn test_rotated_vehicle_localizes() {
    // Vehicle at (2, 1) facing +y sees landmark 1 straight ahead and landmark 2 to its right
    let truth = Pose::new(2.0, 1.0, PI / 2.0);
    let map = LandmarkMap::new(vec![
        Landmark::new(1, 2.0, 6.0),
        Landmark::new(2, 5.0, 1.0),
        Landmark::new(3, -4.0, -4.0),
    ])
    .unwrap();
    let observations = [Observation::new(5.0, 0.0), Observation::new(0.0, -3.0)];
    let mut pf = ParticleFilter::new(FilterConfig {
        num_particles: 500,
        seed: Some(10),
        averaging_strategy: ParticleAveragingStrategy::WeightedAverage,
        ..FilterConfig::default()
    })
    .unwrap();
    pf.init(2.3, 0.8, PI / 2.0 + 0.05, &[0.3, 0.3, 0.05]).unwrap();
    pf.update_weights(10.0, &[0.2, 0.2], &observations, &map)
        .unwrap();
    let best = pf.best_particle().unwrap();
    assert_eq!(best.associations(), &[1, 2]);
    let estimate = pf.estimate().unwrap();
    assert!(estimate.distance(&truth) < 0.4, "estimate {estimate}");
    assert!(wrap_to_pi(estimate.theta - truth.theta).abs() < 0.08);
}

#[test]
fn test_zero_yaw_rate_moves_straight() {
    let mut pf = ParticleFilter::with_seed(5, 1).unwrap();
    pf.init(1.0, 2.0, 0.0, &[0.0; 3]).unwrap();
    pf.predict(1.0, &[0.0; 3], 10.0, 0.0).unwrap();
    for p in pf.particles() {
        assert_approx_eq!(p.x, 11.0, 1e-12);
        assert_approx_eq!(p.y, 2.0, 1e-12);
        assert_approx_eq!(p.theta, 0.0, 1e-12);
    }
    // The free function agrees with the filter
    let pose = propagate(
        Pose::new(1.0, 2.0, 0.0),
        &MotionInput::new(1.0, 10.0, 0.0).unwrap(),
    );
    assert_approx_eq!(pose.x, 11.0, 1e-12);
}

#[test]
fn test_results_and_config_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = scenario_config(20, 30, 2);
    let config_path = dir.path().join("sim.toml");
    config.to_file(&config_path).unwrap();
    let loaded = SimulationConfig::from_file(&config_path).unwrap();
    assert_eq!(loaded, config);

    let scenario = generate_scenario(&loaded).unwrap();
    let results = run_simulation(&loaded, &scenario).unwrap();
    let csv_path = dir.path().join("results.csv");
    StepResult::to_csv(&results, &csv_path).unwrap();
    let header = std::fs::read_to_string(&csv_path).unwrap();
    assert!(header.starts_with("step,time,true_x,true_y,true_theta,estimate_x"));
    let read_back = StepResult::from_csv(&csv_path).unwrap();
    assert_eq!(read_back.len(), 20);
    assert_eq!(read_back[0].associations, results[0].associations);
}
