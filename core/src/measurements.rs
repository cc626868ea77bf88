//! Landmark observations and the measurement model
//!
//! Observations arrive in the vehicle frame. To score a particle, each observation is moved into
//! the map frame as if the vehicle stood at that particle's pose, matched to the nearest landmark,
//! and scored with an axis-independent bivariate Gaussian:
//!
//! $$
//! p(d_x, d_y) = \frac{1}{2\pi\sigma_x\sigma_y}
//! \exp\left(-\left(\frac{d_x^2}{2\sigma_x^2} + \frac{d_y^2}{2\sigma_y^2}\right)\right)
//! $$
//!
//! The particle weight is the product of these densities over all observations of the tick.

use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::Pose;
use crate::error::{FilterError, Result};
use crate::map::{Landmark, LandmarkMap};
use crate::particle::Particle;

/// A landmark observation in the vehicle frame (x forward, y left), in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
}
impl Observation {
    pub fn new(x: f64, y: f64) -> Self {
        Observation { x, y }
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

fn pose_isometry(pose: &Pose) -> Isometry2<f64> {
    Isometry2::new(Vector2::new(pose.x, pose.y), pose.theta)
}

/// Transform a vehicle-frame observation into the map frame: rotate by the pose heading, then
/// translate by the pose position.
pub fn to_map_frame(pose: &Pose, observation: &Observation) -> Point2<f64> {
    pose_isometry(pose) * Point2::new(observation.x, observation.y)
}

/// Inverse of [`to_map_frame`]: express a map-frame point in the vehicle frame at `pose`.
pub fn to_vehicle_frame(pose: &Pose, point: &Point2<f64>) -> Observation {
    let local = pose_isometry(pose).inverse_transform_point(point);
    Observation::new(local.x, local.y)
}

/// Index of the landmark nearest to `point`.
///
/// Linear scan over the map. Only a strictly smaller distance replaces the current best, so on
/// exact ties the landmark that comes first in the map wins.
pub fn associate(point: &Point2<f64>, map: &LandmarkMap) -> Result<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, landmark) in map.iter().enumerate() {
        let dist_sq = (point.x - landmark.x).powi(2) + (point.y - landmark.y).powi(2);
        match best {
            Some((_, best_sq)) if dist_sq >= best_sq => {}
            _ => best = Some((i, dist_sq)),
        }
    }
    best.map(|(i, _)| i).ok_or(FilterError::EmptyMap)
}

/// Nearest landmark to `point`.
pub fn nearest_landmark<'a>(point: &Point2<f64>, map: &'a LandmarkMap) -> Result<&'a Landmark> {
    let index = associate(point, map)?;
    map.get(index).ok_or(FilterError::EmptyMap)
}

/// Axis-independent bivariate Gaussian density of the offset `(dx, dy)`.
pub fn bivariate_gaussian(dx: f64, dy: f64, sigma_x: f64, sigma_y: f64) -> f64 {
    let normalizer = 1.0 / (2.0 * PI * sigma_x * sigma_y);
    let exponent = dx * dx / (2.0 * sigma_x * sigma_x) + dy * dy / (2.0 * sigma_y * sigma_y);
    normalizer * (-exponent).exp()
}

/// Landmark measurement noise: standard deviations of the observation error along map x and y.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkNoise {
    pub sigma_x: f64,
    pub sigma_y: f64,
}
impl LandmarkNoise {
    /// Both deviations must be strictly positive and finite; the density is undefined otherwise.
    pub fn new(std_landmark: &[f64; 2]) -> Result<Self> {
        for (name, sigma) in [("sigma_x", std_landmark[0]), ("sigma_y", std_landmark[1])] {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(FilterError::InvalidParameter(format!(
                    "landmark {name} must be positive and finite, got {sigma}"
                )));
            }
        }
        Ok(LandmarkNoise {
            sigma_x: std_landmark[0],
            sigma_y: std_landmark[1],
        })
    }
    /// Density of observing `point` when the true landmark is `landmark`.
    pub fn likelihood(&self, point: &Point2<f64>, landmark: &Landmark) -> f64 {
        bivariate_gaussian(
            point.x - landmark.x,
            point.y - landmark.y,
            self.sigma_x,
            self.sigma_y,
        )
    }
    /// Natural log of [`LandmarkNoise::likelihood`]. Stays finite where the density itself would
    /// underflow to zero.
    pub fn log_likelihood(&self, point: &Point2<f64>, landmark: &Landmark) -> f64 {
        let dx = point.x - landmark.x;
        let dy = point.y - landmark.y;
        -(2.0 * PI * self.sigma_x * self.sigma_y).ln()
            - dx * dx / (2.0 * self.sigma_x * self.sigma_x)
            - dy * dy / (2.0 * self.sigma_y * self.sigma_y)
    }
    /// Peak value of the density, reached at zero offset.
    pub fn peak(&self) -> f64 {
        1.0 / (2.0 * PI * self.sigma_x * self.sigma_y)
    }
}

/// Overwrite a particle's weight with the joint likelihood of `observations`.
///
/// The weight is reset to one and multiplied by the density of every observation against its
/// nearest landmark. The matched landmark ids and map-frame observation coordinates are stored on
/// the particle as its association record.
///
/// The product is accumulated as a sum of log densities and the log weight is returned, so the
/// caller can rescale a pass whose weights exceed the `f64` range.
pub fn weigh_particle(
    particle: &mut Particle,
    observations: &[Observation],
    map: &LandmarkMap,
    noise: &LandmarkNoise,
) -> Result<f64> {
    let pose = particle.pose();
    let mut log_weight = 0.0;
    let mut associations = Vec::with_capacity(observations.len());
    let mut sense_x = Vec::with_capacity(observations.len());
    let mut sense_y = Vec::with_capacity(observations.len());
    for observation in observations {
        let point = to_map_frame(&pose, observation);
        let landmark = nearest_landmark(&point, map)?;
        log_weight += noise.log_likelihood(&point, landmark);
        associations.push(landmark.id);
        sense_x.push(point.x);
        sense_y.push(point.y);
    }
    particle.weight = log_weight.exp();
    particle.set_associations(associations, sense_x, sense_y)?;
    Ok(log_weight)
}
