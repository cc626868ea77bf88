//! The landmark particle filter
//!
//! [`ParticleFilter`] owns the particle set, the random number generator and the bookkeeping needed
//! to run the filter cycle:
//!
//! ```text
//! Uninitialized --init--> Initialized --update_weights--> Weighted --resample--> Resampled
//!                              |                             ^                      |
//!                              +--predict--> Predicted ------+        <--predict----+
//! ```
//!
//! The first tick updates directly after `init`; every later tick runs predict, update, resample.
//! Calls made out of this order fail with [`FilterError::OutOfSequence`] (or
//! [`FilterError::Uninitialized`] before `init`) and leave the filter untouched. `init` may be
//! called again at any time to restart from a new pose estimate.
//!
//! # Randomness
//!
//! The filter holds a single [`StdRng`] seeded once at construction, from
//! [`FilterConfig::seed`] when given and from a random seed otherwise. It is never re-created, so
//! successive ticks see fresh draws. During prediction the held generator draws one `u64` per
//! particle, in particle order, and each particle is propagated with its own generator seeded from
//! that value. Runs with the same seed therefore give identical results whether or not the work is
//! spread over threads.

use log::{debug, trace, warn};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

use crate::Pose;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::map::LandmarkMap;
use crate::measurements::{LandmarkNoise, Observation, weigh_particle};
use crate::motion::{MotionInput, PoseNoise, predict_particle};
use crate::particle::{Particle, effective_sample_size, highest_weight};

/// Log weights above this would overflow `f64` once exponentiated.
const MAX_LOG_WEIGHT: f64 = 709.0;

/// Position of the filter in its init/predict/update/resample cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPhase {
    Uninitialized,
    Initialized,
    Predicted,
    Weighted,
    Resampled,
    /// The last update left every weight at zero. Only `init` or `inject_weight_floor` proceed.
    Degenerate,
}

pub struct ParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    phase: FilterPhase,
    max_weight: f64,
    seed: u64,
    rng: StdRng,
}

impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        f.debug_struct("ParticleFilter")
            .field("phase", &self.phase)
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, self.max_weight),
            )
            .field("seed", &self.seed)
            .finish()
    }
}

impl ParticleFilter {
    /// Create an uninitialized filter. Fails if the configuration asks for zero particles.
    pub fn new(config: FilterConfig) -> Result<Self> {
        if config.num_particles == 0 {
            return Err(FilterError::InvalidParameter(
                "number of particles must be positive".to_string(),
            ));
        }
        let seed = config.seed.unwrap_or_else(rand::random);
        debug!(
            "Creating particle filter with {} particles (seed {seed}, {:?} resampling)",
            config.num_particles, config.resampling_strategy
        );
        Ok(ParticleFilter {
            particles: Vec::with_capacity(config.num_particles),
            phase: FilterPhase::Uninitialized,
            max_weight: 0.0,
            seed,
            rng: StdRng::seed_from_u64(seed),
            config,
        })
    }

    /// Create a filter with `num_particles` particles and a fixed seed, other settings default.
    pub fn with_seed(num_particles: usize, seed: u64) -> Result<Self> {
        Self::new(FilterConfig {
            num_particles,
            seed: Some(seed),
            ..FilterConfig::default()
        })
    }

    /// Scatter the particles around an initial pose estimate.
    ///
    /// Each particle's x, y and heading are drawn independently from Gaussians centred on the
    /// estimate with standard deviations `std = [x, y, theta]`. Particles get ids `0..N` and
    /// weight 1. Any previous particle set is discarded.
    pub fn init(&mut self, x: f64, y: f64, theta: f64, std: &[f64; 3]) -> Result<()> {
        if !x.is_finite() || !y.is_finite() || !theta.is_finite() {
            return Err(FilterError::InvalidParameter(format!(
                "initial pose must be finite, got ({x}, {y}, {theta})"
            )));
        }
        let noise = PoseNoise::new(std)?;
        let estimate = Pose::new(x, y, theta);
        let mut particles = Vec::with_capacity(self.config.num_particles);
        for id in 0..self.config.num_particles {
            let pose = noise.perturb(estimate, &mut self.rng);
            particles.push(Particle::new(id, pose.x, pose.y, pose.theta, 1.0));
        }
        self.particles = particles;
        self.max_weight = 1.0;
        self.phase = FilterPhase::Initialized;
        debug!(
            "Initialized {} particles around {estimate} with std {std:?}",
            self.particles.len()
        );
        Ok(())
    }

    /// Move every particle through the motion model and add process noise.
    ///
    /// `std_pos = [x, y, theta]` are the process-noise standard deviations. Weights are unchanged.
    pub fn predict(
        &mut self,
        delta_t: f64,
        std_pos: &[f64; 3],
        velocity: f64,
        yaw_rate: f64,
    ) -> Result<()> {
        self.require("predict", &[FilterPhase::Initialized, FilterPhase::Resampled])?;
        let input = MotionInput::new(delta_t, velocity, yaw_rate)?;
        let noise = PoseNoise::new(std_pos)?;
        let seeds: Vec<u64> = (0..self.particles.len())
            .map(|_| self.rng.random())
            .collect();
        let step = |(particle, seed): (&mut Particle, &u64)| {
            let mut rng = StdRng::seed_from_u64(*seed);
            predict_particle(particle, &input, &noise, &mut rng);
        };
        if self.config.parallel {
            self.particles.par_iter_mut().zip(seeds.par_iter()).for_each(step);
        } else {
            self.particles.iter_mut().zip(seeds.iter()).for_each(step);
        }
        self.phase = FilterPhase::Predicted;
        trace!("Predicted with {input:?}, process noise {std_pos:?}");
        Ok(())
    }

    /// Reweight every particle by the likelihood of the current observations.
    ///
    /// `sensor_range` is the range the observations were gathered within; the batch is expected
    /// to be filtered to that range already. `std_landmark = [x, y]` are the observation noise
    /// standard deviations. Each particle's weight is overwritten (reset to 1, then multiplied by
    /// the density of each observation against its nearest landmark) and its association record is
    /// replaced. If the largest weight would overflow `f64`, all weights of the pass are divided by
    /// it so the best particle ends at weight 1. Fails with [`FilterError::DegenerateWeights`] when
    /// every resulting weight is zero.
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: &[f64; 2],
        observations: &[Observation],
        map: &LandmarkMap,
    ) -> Result<()> {
        self.require(
            "update weights",
            &[FilterPhase::Initialized, FilterPhase::Predicted],
        )?;
        if !sensor_range.is_finite() || sensor_range <= 0.0 {
            return Err(FilterError::InvalidParameter(format!(
                "sensor range must be positive and finite, got {sensor_range}"
            )));
        }
        let noise = LandmarkNoise::new(std_landmark)?;
        if let Some(bad) = observations.iter().find(|o| !o.is_finite()) {
            return Err(FilterError::InvalidParameter(format!(
                "observation must be finite, got {bad:?}"
            )));
        }
        if !observations.is_empty() && map.is_empty() {
            return Err(FilterError::EmptyMap);
        }
        trace!(
            "Reweighting {} particles with {} observations (sensor range {sensor_range} m) against {} landmarks",
            self.particles.len(),
            observations.len(),
            map.len()
        );

        let weigh = |particle: &mut Particle| weigh_particle(particle, observations, map, &noise);
        let log_weights: Vec<f64> = if self.config.parallel {
            self.particles.par_iter_mut().map(weigh).collect::<Result<_>>()?
        } else {
            self.particles.iter_mut().map(weigh).collect::<Result<_>>()?
        };
        let max_log_weight = log_weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max_log_weight > MAX_LOG_WEIGHT {
            // Weights only need to be proportional within a pass
            for (particle, log_weight) in self.particles.iter_mut().zip(&log_weights) {
                particle.weight = (log_weight - max_log_weight).exp();
            }
            debug!("Rescaled weights by exp(-{max_log_weight:.1}) to keep them finite");
        }

        self.max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        if self.max_weight <= 0.0 {
            warn!(
                "All {} particle weights collapsed to zero after {} observations",
                self.particles.len(),
                observations.len()
            );
            self.phase = FilterPhase::Degenerate;
            return Err(FilterError::DegenerateWeights);
        }
        self.phase = FilterPhase::Weighted;
        debug!(
            "Updated weights: max {:.4e}, effective sample size {:.1}",
            self.max_weight,
            self.effective_sample_size()
        );
        Ok(())
    }

    /// Replace the particle set with `N` particles drawn with replacement according to weight.
    pub fn resample(&mut self) -> Result<()> {
        self.require("resample", &[FilterPhase::Weighted])?;
        let resampled = self.config.resampling_strategy.resample(
            &self.particles,
            self.max_weight,
            &mut self.rng,
        )?;
        debug_assert_eq!(resampled.len(), self.particles.len());
        self.particles = resampled;
        self.phase = FilterPhase::Resampled;
        trace!("Resampled {} particles", self.particles.len());
        Ok(())
    }

    /// Raise every weight to at least `floor` so the cycle can continue after
    /// [`FilterError::DegenerateWeights`]. Also accepted right after a successful update.
    pub fn inject_weight_floor(&mut self, floor: f64) -> Result<()> {
        self.require(
            "inject a weight floor",
            &[FilterPhase::Weighted, FilterPhase::Degenerate],
        )?;
        if !floor.is_finite() || floor <= 0.0 {
            return Err(FilterError::InvalidParameter(format!(
                "weight floor must be positive and finite, got {floor}"
            )));
        }
        for particle in &mut self.particles {
            particle.weight = particle.weight.max(floor);
        }
        self.max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        self.phase = FilterPhase::Weighted;
        debug!("Injected weight floor {floor:e}");
        Ok(())
    }

    fn require(&self, operation: &'static str, allowed: &[FilterPhase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else if self.phase == FilterPhase::Uninitialized {
            Err(FilterError::Uninitialized)
        } else {
            Err(FilterError::OutOfSequence {
                operation,
                phase: self.phase,
            })
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    /// Configured population size `N`.
    pub fn num_particles(&self) -> usize {
        self.config.num_particles
    }
    pub fn phase(&self) -> FilterPhase {
        self.phase
    }
    pub fn is_initialized(&self) -> bool {
        self.phase != FilterPhase::Uninitialized
    }
    /// Largest particle weight of the most recent reweighting pass.
    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }
    /// Seed the random number generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    /// The highest-weight particle (the first one on ties).
    pub fn best_particle(&self) -> Result<&Particle> {
        highest_weight(&self.particles).ok_or(FilterError::Uninitialized)
    }
    /// Pose estimate according to the configured averaging strategy.
    pub fn estimate(&self) -> Result<Pose> {
        self.estimate_with_covariance().map(|(pose, _)| pose)
    }
    /// Pose estimate and its 3x3 (x, y, theta) covariance.
    pub fn estimate_with_covariance(&self) -> Result<(Pose, Matrix3<f64>)> {
        self.config.averaging_strategy.estimate(&self.particles)
    }
    pub fn effective_sample_size(&self) -> f64 {
        effective_sample_size(&self.particles)
    }
}
