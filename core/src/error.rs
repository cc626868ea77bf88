//! Error types for the particle filter.
//!
//! Every fallible filter operation returns [`Result`]. The filter never substitutes a default
//! pose or silently continues with an invalid particle set; recovery (reinitializing, widening
//! noise, injecting a weight floor) is left to the caller.

use crate::filter::FilterPhase;

/// Result type alias
pub type Result<T> = std::result::Result<T, FilterError>;

/// Particle filter error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    /// An operation was invoked before `init`
    #[error("particle filter has not been initialized")]
    Uninitialized,

    /// An operation was invoked outside the init -> predict -> update -> resample cycle
    #[error("cannot {operation} while the filter is in the {phase:?} phase")]
    OutOfSequence {
        /// Name of the rejected operation
        operation: &'static str,
        /// Phase the filter was in when the operation was attempted
        phase: FilterPhase,
    },

    /// Data association attempted against a map with no landmarks
    #[error("landmark map is empty; cannot associate observations")]
    EmptyMap,

    /// Every particle weight collapsed to zero after a reweighting pass
    #[error("all particle weights are zero; no particle explains the observations")]
    DegenerateWeights,

    /// Bad numeric input (negative deviation, non-positive time step, NaN, ...)
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The debug association arrays were given with different lengths
    #[error(
        "association arrays differ in length: associations={associations}, sense_x={sense_x}, sense_y={sense_y}"
    )]
    AssociationLengthMismatch {
        associations: usize,
        sense_x: usize,
        sense_y: usize,
    },
}

/// Check that a standard deviation is finite and non-negative.
pub(crate) fn check_std(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FilterError::InvalidParameter(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}
