//! Resampling strategies
//!
//! Every strategy draws `N` indices with replacement from a weight vector of length `N`. The
//! weights do not need to be normalized. Each strategy refuses a weight vector that is empty,
//! contains a negative or non-finite entry, or has no strictly positive entry, and none of them
//! ever selects a zero-weight particle.
//!
//! - [`ParticleResamplingStrategy::Wheel`]: the resampling wheel. Start at a uniformly random
//!   index and, for every output, add a uniform draw in `[0, max_weight)` to an accumulator, then
//!   walk forward around the wheel subtracting weights until the accumulator fits inside the current
//!   particle's weight.
//! - [`ParticleResamplingStrategy::Systematic`]: low-variance resampling with a single random
//!   offset and `N` evenly spaced pointers into the cumulative weights.
//! - [`ParticleResamplingStrategy::Multinomial`]: `N` independent draws from the cumulative weights.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::particle::Particle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ParticleResamplingStrategy {
    #[default]
    Wheel,
    Systematic,
    Multinomial,
}

impl ParticleResamplingStrategy {
    /// Draw `weights.len()` indices. `max_weight` must be the maximum of `weights`; any other
    /// value is rejected with [`FilterError::InvalidParameter`].
    pub fn resample_indices<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        max_weight: f64,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let (last_positive, actual_max) = validate_weights(weights)?;
        if max_weight != actual_max {
            return Err(FilterError::InvalidParameter(format!(
                "max weight {max_weight} does not match the largest particle weight {actual_max}"
            )));
        }
        let indices = match self {
            ParticleResamplingStrategy::Wheel => wheel_resample(weights, max_weight, rng),
            ParticleResamplingStrategy::Systematic => {
                systematic_resample(weights, last_positive, rng)
            }
            ParticleResamplingStrategy::Multinomial => {
                multinomial_resample(weights, last_positive, rng)
            }
        };
        Ok(indices)
    }
    /// Build the resampled particle set. Selected particles are cloned whole, keeping their id,
    /// weight and association record.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        particles: &[Particle],
        max_weight: f64,
        rng: &mut R,
    ) -> Result<Vec<Particle>> {
        let weights: Vec<f64> = particles.iter().map(|p| p.weight).collect();
        let indices = self.resample_indices(&weights, max_weight, rng)?;
        Ok(indices.into_iter().map(|i| particles[i].clone()).collect())
    }
}

/// Returns the index of the last strictly positive weight and the largest weight.
fn validate_weights(weights: &[f64]) -> Result<(usize, f64)> {
    if weights.is_empty() {
        return Err(FilterError::Uninitialized);
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(FilterError::InvalidParameter(format!(
            "particle weights must be finite and non-negative, found {bad}"
        )));
    }
    let last_positive = weights
        .iter()
        .rposition(|w| *w > 0.0)
        .ok_or(FilterError::DegenerateWeights)?;
    Ok((last_positive, weights.iter().cloned().fold(0.0, f64::max)))
}

fn wheel_resample<R: Rng + ?Sized>(weights: &[f64], max_weight: f64, rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let mut index = rng.random_range(0..n);
    let mut beta = 0.0;
    let mut indices = Vec::with_capacity(n);
    for _ in 0..n {
        beta += rng.random::<f64>() * max_weight;
        // Zero weights are always stepped over; at least one positive weight ends the walk
        while beta > weights[index] || weights[index] <= 0.0 {
            beta -= weights[index];
            index = (index + 1) % n;
        }
        indices.push(index);
    }
    indices
}

fn systematic_resample<R: Rng + ?Sized>(
    weights: &[f64],
    last_positive: usize,
    rng: &mut R,
) -> Vec<usize> {
    let n = weights.len();
    let total: f64 = weights.iter().sum();
    let step = total / n as f64;
    let offset = rng.random::<f64>() * step;
    let mut indices = Vec::with_capacity(n);
    let mut i = 0;
    let mut cumsum = weights[0];
    for j in 0..n {
        let pointer = offset + j as f64 * step;
        while pointer >= cumsum && i < n - 1 {
            i += 1;
            cumsum += weights[i];
        }
        // Rounding can push the last pointer past the final cumulative sum
        indices.push(if weights[i] > 0.0 { i } else { last_positive });
    }
    indices
}

fn multinomial_resample<R: Rng + ?Sized>(
    weights: &[f64],
    last_positive: usize,
    rng: &mut R,
) -> Vec<usize> {
    let n = weights.len();
    let cdf: Vec<f64> = weights
        .iter()
        .scan(0.0, |acc, w| {
            *acc += w;
            Some(*acc)
        })
        .collect();
    let total = cdf[n - 1];
    (0..n)
        .map(|_| {
            let u = rng.random::<f64>() * total;
            let idx = cdf.partition_point(|c| *c <= u);
            if idx < n && weights[idx] > 0.0 {
                idx
            } else {
                last_positive
            }
        })
        .collect()
}
