//! Velocity / yaw-rate motion model
//!
//! The prediction step moves every particle with the commanded forward velocity `v` and yaw rate
//! `omega` held constant over the time step `dt`. With a non-zero yaw rate the vehicle follows a
//! circular arc:
//!
//! $$
//! x' = x + \frac{v}{\omega}\left(\sin(\theta + \omega\,dt) - \sin\theta\right), \quad
//! y' = y + \frac{v}{\omega}\left(\cos\theta - \cos(\theta + \omega\,dt)\right), \quad
//! \theta' = \theta + \omega\,dt
//! $$
//!
//! and when the yaw rate is numerically zero it drives in a straight line:
//!
//! $$
//! x' = x + v\cos\theta\,dt, \quad y' = y + v\sin\theta\,dt, \quad \theta' = \theta
//! $$
//!
//! Independent zero-mean Gaussian process noise is then added to each of `x'`, `y'` and `theta'`.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::Pose;
use crate::error::{FilterError, Result, check_std};
use crate::particle::Particle;

/// Yaw rates with a smaller magnitude than this use the straight-line model.
pub const YAW_RATE_EPSILON: f64 = 1e-6;

/// Control input applied over one prediction step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionInput {
    /// Elapsed time in seconds, must be positive
    pub delta_t: f64,
    /// Forward velocity (m/s)
    pub velocity: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
}
impl MotionInput {
    pub fn new(delta_t: f64, velocity: f64, yaw_rate: f64) -> Result<Self> {
        if !delta_t.is_finite() || delta_t <= 0.0 {
            return Err(FilterError::InvalidParameter(format!(
                "delta_t must be positive and finite, got {delta_t}"
            )));
        }
        if !velocity.is_finite() || !yaw_rate.is_finite() {
            return Err(FilterError::InvalidParameter(format!(
                "velocity ({velocity}) and yaw rate ({yaw_rate}) must be finite"
            )));
        }
        Ok(MotionInput {
            delta_t,
            velocity,
            yaw_rate,
        })
    }
}

/// Deterministic part of the motion model: move `pose` by `input` without noise.
pub fn propagate(pose: Pose, input: &MotionInput) -> Pose {
    let MotionInput {
        delta_t,
        velocity,
        yaw_rate,
    } = *input;
    if yaw_rate.abs() < YAW_RATE_EPSILON {
        Pose::new(
            pose.x + velocity * pose.theta.cos() * delta_t,
            pose.y + velocity * pose.theta.sin() * delta_t,
            pose.theta,
        )
    } else {
        let theta_new = pose.theta + yaw_rate * delta_t;
        let radius = velocity / yaw_rate;
        Pose::new(
            pose.x + radius * (theta_new.sin() - pose.theta.sin()),
            pose.y + radius * (pose.theta.cos() - theta_new.cos()),
            theta_new,
        )
    }
}

/// Additive Gaussian noise on (x, y, theta).
#[derive(Clone, Copy, Debug)]
pub struct PoseNoise {
    x: Normal<f64>,
    y: Normal<f64>,
    theta: Normal<f64>,
}
impl PoseNoise {
    /// Build the noise model from per-axis standard deviations `[x, y, theta]`.
    pub fn new(std: &[f64; 3]) -> Result<Self> {
        check_std("std x", std[0])?;
        check_std("std y", std[1])?;
        check_std("std theta", std[2])?;
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| FilterError::InvalidParameter(e.to_string()))
        };
        Ok(PoseNoise {
            x: normal(std[0])?,
            y: normal(std[1])?,
            theta: normal(std[2])?,
        })
    }
    /// Draw one `(dx, dy, dtheta)` perturbation.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64, f64) {
        (
            self.x.sample(rng),
            self.y.sample(rng),
            self.theta.sample(rng),
        )
    }
    /// Perturb a pose with a fresh draw.
    pub fn perturb<R: Rng + ?Sized>(&self, pose: Pose, rng: &mut R) -> Pose {
        let (dx, dy, dtheta) = self.sample(rng);
        Pose::new(pose.x + dx, pose.y + dy, pose.theta + dtheta)
    }
}

/// Move one particle through the motion model and add process noise. The weight is untouched.
pub fn predict_particle<R: Rng + ?Sized>(
    particle: &mut Particle,
    input: &MotionInput,
    noise: &PoseNoise,
    rng: &mut R,
) {
    let moved = noise.perturb(propagate(particle.pose(), input), rng);
    particle.x = moved.x;
    particle.y = moved.y;
    particle.theta = moved.theta;
}
