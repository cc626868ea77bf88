//! Particles and particle-set statistics.
//!
//! A [`Particle`] is one weighted hypothesis of the vehicle pose. Besides the pose and weight it
//! carries three parallel debug arrays (the landmark each observation was associated with and the
//! map-frame coordinates of that observation) that are only ever replaced together through
//! [`Particle::set_associations`].
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::error::{FilterError, Result};
use crate::{Pose, wrap_to_pi};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Heading in radians
    pub theta: f64,
    pub weight: f64,
    associations: Vec<i32>,
    sense_x: Vec<f64>,
    sense_y: Vec<f64>,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("theta", &self.theta)
            .field("weight", &self.weight)
            .field("associations", &self.associations.len())
            .finish()
    }
}

/// Selects which of the two sensed-coordinate debug arrays to format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenseAxis {
    X,
    Y,
}

impl Particle {
    pub fn new(id: usize, x: f64, y: f64, theta: f64, weight: f64) -> Particle {
        Particle {
            id,
            x,
            y,
            theta,
            weight,
            associations: Vec::new(),
            sense_x: Vec::new(),
            sense_y: Vec::new(),
        }
    }
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }
    /// Replace all three debug arrays at once.
    ///
    /// `associations[i]` is the landmark id matched to the i-th observation and
    /// `(sense_x[i], sense_y[i])` is that observation in map coordinates. The arrays must have the
    /// same length; on mismatch nothing is modified.
    pub fn set_associations(
        &mut self,
        associations: Vec<i32>,
        sense_x: Vec<f64>,
        sense_y: Vec<f64>,
    ) -> Result<()> {
        if associations.len() != sense_x.len() || associations.len() != sense_y.len() {
            return Err(FilterError::AssociationLengthMismatch {
                associations: associations.len(),
                sense_x: sense_x.len(),
                sense_y: sense_y.len(),
            });
        }
        self.associations = associations;
        self.sense_x = sense_x;
        self.sense_y = sense_y;
        Ok(())
    }
    pub fn associations(&self) -> &[i32] {
        &self.associations
    }
    pub fn sense_x(&self) -> &[f64] {
        &self.sense_x
    }
    pub fn sense_y(&self) -> &[f64] {
        &self.sense_y
    }
    /// Space separated landmark ids, e.g. `"1 4 9"`.
    pub fn associations_string(&self) -> String {
        join_space(self.associations.iter())
    }
    /// Space separated sensed coordinates along one axis, printed at single precision.
    pub fn sense_coord_string(&self, axis: SenseAxis) -> String {
        let values = match axis {
            SenseAxis::X => &self.sense_x,
            SenseAxis::Y => &self.sense_y,
        };
        join_space(values.iter().map(|v| *v as f32))
    }
}

fn join_space<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// How a single pose estimate is extracted from the particle set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ParticleAveragingStrategy {
    WeightedAverage,
    UnweightedAverage,
    #[default]
    HighestWeight,
}

impl ParticleAveragingStrategy {
    /// Compute the pose estimate and its spread (3x3 covariance over x, y, theta).
    ///
    /// Headings are averaged on the circle and their deviations are wrapped to [-pi, pi] before
    /// entering the covariance.
    pub fn estimate(&self, particles: &[Particle]) -> Result<(Pose, Matrix3<f64>)> {
        if particles.is_empty() {
            return Err(FilterError::Uninitialized);
        }
        match self {
            ParticleAveragingStrategy::WeightedAverage => {
                let total: f64 = particles.iter().map(|p| p.weight).sum();
                if !(total > 0.0) || !total.is_finite() {
                    return Err(FilterError::DegenerateWeights);
                }
                let weights: Vec<f64> = particles.iter().map(|p| p.weight / total).collect();
                Ok(weighted_moments(particles, &weights))
            }
            ParticleAveragingStrategy::UnweightedAverage => {
                let weights = vec![1.0 / particles.len() as f64; particles.len()];
                Ok(weighted_moments(particles, &weights))
            }
            ParticleAveragingStrategy::HighestWeight => {
                let best = highest_weight(particles).ok_or(FilterError::Uninitialized)?;
                Ok((best.pose(), Matrix3::zeros()))
            }
        }
    }
}

/// The particle with the largest weight; the first one wins on ties.
pub fn highest_weight(particles: &[Particle]) -> Option<&Particle> {
    particles
        .iter()
        .reduce(|best, p| if p.weight > best.weight { p } else { best })
}

/// Effective sample size `1 / sum(w_i^2)` over normalized weights.
pub fn effective_sample_size(particles: &[Particle]) -> f64 {
    let total: f64 = particles.iter().map(|p| p.weight).sum();
    if !(total > 0.0) {
        return 0.0;
    }
    let sum_of_squares: f64 = particles
        .iter()
        .map(|p| (p.weight / total) * (p.weight / total))
        .sum();
    1.0 / sum_of_squares
}

fn weighted_moments(particles: &[Particle], weights: &[f64]) -> (Pose, Matrix3<f64>) {
    let mut x = 0.0;
    let mut y = 0.0;
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    for (p, w) in particles.iter().zip(weights) {
        x += w * p.x;
        y += w * p.y;
        sin_sum += w * p.theta.sin();
        cos_sum += w * p.theta.cos();
    }
    let mean = Pose::new(x, y, sin_sum.atan2(cos_sum));
    let mut cov = Matrix3::<f64>::zeros();
    for (p, w) in particles.iter().zip(weights) {
        let diff = Vector3::new(p.x - mean.x, p.y - mean.y, wrap_to_pi(p.theta - mean.theta));
        cov += *w * diff * diff.transpose();
    }
    (mean, cov)
}
