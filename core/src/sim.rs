//! Simulation utilities for exercising the filter on synthetic data.
//!
//! A [`Scenario`] holds a randomly generated landmark map and a ground-truth drive through it,
//! together with what a vehicle would have reported on each tick: the (optionally noisy) commanded
//! velocity and yaw rate, and the landmarks inside sensor range expressed in the vehicle frame
//! with Gaussian measurement noise. [`run_simulation`] feeds a scenario through a
//! [`ParticleFilter`] the same way a live system would and records one [`StepResult`] per tick.
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::config::{ConfigFile, FilterConfig};
use crate::error::{FilterError, Result, check_std};
use crate::filter::ParticleFilter;
use crate::map::{Landmark, LandmarkMap};
use crate::measurements::{Observation, to_vehicle_frame};
use crate::motion::{MotionInput, PoseNoise, propagate};
use crate::{Pose, wrap_to_pi};

/// Weight floor applied when an update leaves every particle at zero weight.
pub const DEGENERATE_WEIGHT_FLOOR: f64 = f64::MIN_POSITIVE;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub filter: FilterConfig,
    /// Number of filter ticks to simulate
    pub steps: usize,
    /// Time between ticks (s)
    pub delta_t: f64,
    /// Commanded forward velocity (m/s)
    pub velocity: f64,
    /// Commanded yaw rate (rad/s)
    pub yaw_rate: f64,
    pub initial_pose: Pose,
    /// Deviation of the initial pose estimate handed to `init` (x, y, theta)
    pub init_std: [f64; 3],
    /// Process noise used by the filter's motion model (x, y, theta)
    pub process_std: [f64; 3],
    /// Observation noise, used both to corrupt observations and by the filter (x, y)
    pub landmark_std: [f64; 2],
    /// Noise on the reported velocity (m/s) and yaw rate (rad/s)
    pub control_std: [f64; 2],
    /// Landmarks farther than this from the true vehicle position are not observed (m)
    pub sensor_range: f64,
    pub num_landmarks: usize,
    /// Landmarks are scattered uniformly over a square of this half-width around the origin (m)
    pub map_half_width: f64,
    /// Seed for the scenario generator (independent from the filter seed)
    pub scenario_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            filter: FilterConfig {
                seed: Some(42),
                ..FilterConfig::default()
            },
            steps: 500,
            delta_t: 0.1,
            velocity: 10.0,
            yaw_rate: 0.1,
            initial_pose: Pose::new(0.0, -100.0, 0.0),
            init_std: [0.3, 0.3, 0.01],
            process_std: [0.3, 0.3, 0.01],
            landmark_std: [0.3, 0.3],
            control_std: [0.0, 0.0],
            sensor_range: 50.0,
            num_landmarks: 60,
            map_half_width: 150.0,
            scenario_seed: 7,
        }
    }
}

impl ConfigFile for SimulationConfig {}

/// What the vehicle reports on one tick, plus the true pose for scoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub truth: Pose,
    /// Control applied since the previous tick (unused on the first tick)
    pub control: MotionInput,
    /// Noisy initial pose estimate, as a GPS fix would provide it
    pub gps: Pose,
    pub observations: Vec<Observation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub map: LandmarkMap,
    pub ticks: Vec<Tick>,
}

/// One row of simulation output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    pub time: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_theta: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub estimate_theta: f64,
    pub position_error: f64,
    pub heading_error: f64,
    pub num_observations: usize,
    pub effective_sample_size: f64,
    /// Landmark ids matched by the best particle, space separated
    pub associations: String,
}

impl StepResult {
    /// Writes a slice of results to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Reads results back from a CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> io::Result<Vec<Self>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in reader.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }
}

fn normal(name: &str, sigma: f64) -> Result<Normal<f64>> {
    check_std(name, sigma)?;
    Normal::new(0.0, sigma).map_err(|e| FilterError::InvalidParameter(e.to_string()))
}

/// Build a random landmark map and a ground-truth drive with the observations seen along it.
pub fn generate_scenario(config: &SimulationConfig) -> Result<Scenario> {
    let input = MotionInput::new(config.delta_t, config.velocity, config.yaw_rate)?;
    if !config.map_half_width.is_finite() || config.map_half_width <= 0.0 {
        return Err(FilterError::InvalidParameter(format!(
            "map half width must be positive, got {}",
            config.map_half_width
        )));
    }
    let mut rng = StdRng::seed_from_u64(config.scenario_seed);
    let half = config.map_half_width;
    let landmarks = (0..config.num_landmarks)
        .map(|i| {
            Landmark::new(
                i as i32 + 1,
                rng.random_range(-half..half),
                rng.random_range(-half..half),
            )
        })
        .collect();
    let map = LandmarkMap::new(landmarks)?;

    let gps_noise = PoseNoise::new(&config.init_std)?;
    let obs_x = normal("landmark std x", config.landmark_std[0])?;
    let obs_y = normal("landmark std y", config.landmark_std[1])?;
    let velocity_noise = normal("velocity std", config.control_std[0])?;
    let yaw_rate_noise = normal("yaw rate std", config.control_std[1])?;

    let mut ticks = Vec::with_capacity(config.steps);
    let mut truth = config.initial_pose;
    for step in 0..config.steps {
        if step > 0 {
            truth = propagate(truth, &input);
        }
        let control = MotionInput {
            velocity: config.velocity + velocity_noise.sample(&mut rng),
            yaw_rate: config.yaw_rate + yaw_rate_noise.sample(&mut rng),
            ..input
        };
        let observations = map
            .iter()
            .filter(|l| (l.x - truth.x).hypot(l.y - truth.y) <= config.sensor_range)
            .map(|l| {
                let local = to_vehicle_frame(&truth, &nalgebra::Point2::new(l.x, l.y));
                Observation::new(
                    local.x + obs_x.sample(&mut rng),
                    local.y + obs_y.sample(&mut rng),
                )
            })
            .collect();
        ticks.push(Tick {
            truth,
            control,
            gps: gps_noise.perturb(truth, &mut rng),
            observations,
        });
    }
    Ok(Scenario { map, ticks })
}

/// Drive a particle filter through `scenario` and score it against the ground truth.
///
/// The first tick initializes the filter at the noisy GPS fix and updates straight away; every
/// later tick predicts with the reported control, then updates and resamples. If an update leaves
/// every weight at zero the weights are floored at [`DEGENERATE_WEIGHT_FLOOR`] and the tick goes on.
pub fn run_simulation(config: &SimulationConfig, scenario: &Scenario) -> Result<Vec<StepResult>> {
    let mut pf = ParticleFilter::new(config.filter.clone())?;
    let mut results = Vec::with_capacity(scenario.ticks.len());
    for (step, tick) in scenario.ticks.iter().enumerate() {
        if step == 0 {
            pf.init(tick.gps.x, tick.gps.y, tick.gps.theta, &config.init_std)?;
        } else {
            pf.predict(
                tick.control.delta_t,
                &config.process_std,
                tick.control.velocity,
                tick.control.yaw_rate,
            )?;
        }
        match pf.update_weights(
            config.sensor_range,
            &config.landmark_std,
            &tick.observations,
            &scenario.map,
        ) {
            Ok(()) => {}
            Err(FilterError::DegenerateWeights) => {
                warn!("Step {step}: no particle explains the observations, flooring weights");
                pf.inject_weight_floor(DEGENERATE_WEIGHT_FLOOR)?;
            }
            Err(e) => return Err(e),
        }
        let effective_sample_size = pf.effective_sample_size();
        let estimate = pf.estimate()?;
        let associations = pf.best_particle()?.associations_string();
        pf.resample()?;

        results.push(StepResult {
            step,
            time: step as f64 * config.delta_t,
            true_x: tick.truth.x,
            true_y: tick.truth.y,
            true_theta: tick.truth.theta,
            estimate_x: estimate.x,
            estimate_y: estimate.y,
            estimate_theta: estimate.theta,
            position_error: estimate.distance(&tick.truth),
            heading_error: wrap_to_pi(estimate.theta - tick.truth.theta),
            num_observations: tick.observations.len(),
            effective_sample_size,
            associations,
        });
    }
    if let Some((position, heading)) = rms_errors(&results) {
        info!(
            "Simulated {} steps with {} particles: RMS position error {position:.3} m, RMS heading error {heading:.4} rad",
            results.len(),
            pf.num_particles()
        );
    }
    Ok(results)
}

/// Root-mean-square position and heading errors over a run.
pub fn rms_errors(results: &[StepResult]) -> Option<(f64, f64)> {
    if results.is_empty() {
        return None;
    }
    let n = results.len() as f64;
    let position = (results.iter().map(|r| r.position_error.powi(2)).sum::<f64>() / n).sqrt();
    let heading = (results.iter().map(|r| r.heading_error.powi(2)).sum::<f64>() / n).sqrt();
    Some((position, heading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn short_config() -> SimulationConfig {
        SimulationConfig {
            steps: 50,
            filter: FilterConfig {
                num_particles: 100,
                seed: Some(3),
                ..FilterConfig::default()
            },
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_scenario_generation() {
        let config = short_config();
        let scenario = generate_scenario(&config).unwrap();
        assert_eq!(scenario.map.len(), config.num_landmarks);
        assert_eq!(scenario.ticks.len(), config.steps);
        assert_eq!(scenario.ticks[0].truth, config.initial_pose);
        // Ground truth follows the noiseless motion model
        let expected = propagate(
            config.initial_pose,
            &MotionInput::new(config.delta_t, config.velocity, config.yaw_rate).unwrap(),
        );
        assert_approx_eq!(scenario.ticks[1].truth.x, expected.x, 1e-12);
        assert_approx_eq!(scenario.ticks[1].truth.y, expected.y, 1e-12);
        for tick in &scenario.ticks {
            for obs in &tick.observations {
                // Range gate plus a generous allowance for measurement noise
                assert!(obs.x.hypot(obs.y) <= config.sensor_range + 3.0);
            }
        }
    }

    #[test]
    fn test_scenario_is_reproducible() {
        let config = short_config();
        assert_eq!(
            generate_scenario(&config).unwrap(),
            generate_scenario(&config).unwrap()
        );
    }

    #[test]
    fn test_invalid_scenario_config() {
        let config = SimulationConfig {
            delta_t: 0.0,
            ..short_config()
        };
        assert!(generate_scenario(&config).is_err());
        let config = SimulationConfig {
            landmark_std: [-0.3, 0.3],
            ..short_config()
        };
        assert!(generate_scenario(&config).is_err());
    }

    #[test]
    fn test_run_simulation_tracks_truth() {
        let config = short_config();
        let scenario = generate_scenario(&config).unwrap();
        let results = run_simulation(&config, &scenario).unwrap();
        assert_eq!(results.len(), config.steps);
        let (position, heading) = rms_errors(&results).unwrap();
        assert!(position < 1.0, "RMS position error {position}");
        assert!(heading < 0.05, "RMS heading error {heading}");
    }

    #[test]
    fn test_rms_errors_empty() {
        assert!(rms_errors(&[]).is_none());
    }
}
