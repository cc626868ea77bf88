//! Landmark-based particle filter localization
//!
//! This crate estimates the planar pose (position and heading) of a moving vehicle by recursively
//! combining a noisy velocity/yaw-rate motion model with noisy observations of landmarks whose
//! positions are known in advance. The estimator is a sequential Monte Carlo (particle) filter: a
//! fixed-size population of weighted pose hypotheses is propagated through the motion model,
//! reweighted by how well each hypothesis explains the current observations, and resampled so that
//! the population concentrates around likely poses.
//!
//! The crate is built off of a small set of dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): rotations for the vehicle/map frame transform and
//!   vector/matrix types for estimates.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr):
//!   random number generation for initialization, process noise and resampling.
//! - [`rayon`](https://crates.io/crates/rayon): data-parallel per-particle work.
//!
//! ## Crate overview
//!
//! - [map]: The immutable landmark map.
//! - [particle]: Particles, debug association arrays and particle-set statistics.
//! - [motion]: The velocity / yaw-rate motion model used in the prediction step.
//! - [measurements]: Frame transforms, nearest-neighbor data association and the observation likelihood.
//! - [resampling]: Resampling strategies (resampling wheel, systematic, multinomial).
//! - [filter]: The [`filter::ParticleFilter`] itself and its init/predict/update/resample cycle.
//! - [config]: Serializable filter configuration.
//! - [sim]: A synthetic scenario generator used by the `landmark-pf` binary and the integration tests.
//!
//! ## Coordinate conventions
//!
//! Poses and landmarks live in a right-handed planar map frame, with the heading `theta` measured in
//! radians counter-clockwise from the map x-axis. Observations are reported in the vehicle frame: `x`
//! forward and `y` to the left of the vehicle. A vehicle-frame observation `(o_x, o_y)` seen from the pose
//! `(p_x, p_y, theta)` lies in the map frame at
//!
//! $$
//! \begin{bmatrix} x_m \\\\ y_m \end{bmatrix} = \begin{bmatrix} p_x \\\\ p_y \end{bmatrix} +
//! \begin{bmatrix} \cos\theta & -\sin\theta \\\\ \sin\theta & \cos\theta \end{bmatrix}
//! \begin{bmatrix} o_x \\\\ o_y \end{bmatrix}
//! $$
//!
//! ## Filter cycle
//!
//! ```rust
//! use landmark_pf::filter::ParticleFilter;
//! use landmark_pf::config::FilterConfig;
//! use landmark_pf::map::{Landmark, LandmarkMap};
//! use landmark_pf::measurements::Observation;
//!
//! let map = LandmarkMap::new(vec![Landmark::new(1, 5.0, 3.0), Landmark::new(2, 2.0, -4.0)]).unwrap();
//! let config = FilterConfig { num_particles: 50, seed: Some(7), ..FilterConfig::default() };
//! let mut pf = ParticleFilter::new(config).unwrap();
//!
//! pf.init(0.0, 0.0, 0.0, &[0.3, 0.3, 0.01]).unwrap();
//! pf.update_weights(50.0, &[0.3, 0.3], &[Observation::new(5.0, 3.0)], &map).unwrap();
//! pf.resample().unwrap();
//!
//! pf.predict(0.1, &[0.3, 0.3, 0.01], 1.0, 0.0).unwrap();
//! pf.update_weights(50.0, &[0.3, 0.3], &[Observation::new(4.9, 3.0)], &map).unwrap();
//! pf.resample().unwrap();
//!
//! let best = pf.best_particle().unwrap();
//! println!("best pose: ({:.2}, {:.2}, {:.3})", best.x, best.y, best.theta);
//! ```
pub mod config;
pub mod error;
pub mod filter;
pub mod map;
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod resampling;
pub mod sim;

pub use error::{FilterError, Result};
pub use filter::{FilterPhase, ParticleFilter};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A planar pose: position in the map frame and heading in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}
impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }
    /// Euclidean distance between the positions of two poses (heading is ignored).
    pub fn distance(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.3}, y: {:.3}, theta: {:.4} rad }}",
            self.x, self.y, self.theta
        )
    }
}

/// Wrap an angle to the range $\pm\pi$ radians
///
/// This function is generic and can be used with any type that implements the necessary traits.
///
/// # Arguments
/// * `angle` - The angle to be wrapped
/// # Returns
/// * The wrapped angle, in the range -π to π radians.
/// # Example
/// ```rust
/// use landmark_pf::wrap_to_pi;
/// use std::f64::consts::PI;
/// let angle = 3.0 * PI / 2.0;
/// let wrapped_angle = wrap_to_pi(angle);
/// assert_eq!(wrapped_angle, -PI / 2.0);
/// ```
pub fn wrap_to_pi<T>(angle: T) -> T
where
    T: PartialOrd + Copy + std::ops::SubAssign + std::ops::AddAssign + From<f64>,
{
    let mut wrapped: T = angle;
    while wrapped > T::from(std::f64::consts::PI) {
        wrapped -= T::from(2.0 * std::f64::consts::PI);
    }
    while wrapped < T::from(-std::f64::consts::PI) {
        wrapped += T::from(2.0 * std::f64::consts::PI);
    }
    wrapped
}
