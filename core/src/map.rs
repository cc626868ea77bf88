//! Landmark map
//!
//! The map is an immutable, ordered set of point landmarks in the global (map) frame. It is built
//! once by the caller and only ever read by the filter, so a single `&LandmarkMap` may be shared
//! freely across the worker threads used during reweighting. Iteration order is insertion order,
//! which is what nearest-neighbor association uses to break distance ties.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Display};

use crate::error::{FilterError, Result};

/// A single point landmark with a unique identifier and a fixed position in the map frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: i32,
    pub x: f64,
    pub y: f64,
}
impl Landmark {
    pub fn new(id: i32, x: f64, y: f64) -> Self {
        Landmark { id, x, y }
    }
}
impl Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Landmark {} at ({:.3}, {:.3})", self.id, self.x, self.y)
    }
}

/// Immutable collection of landmarks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkMap {
    landmarks: Vec<Landmark>,
}
impl LandmarkMap {
    /// Build a map from a list of landmarks.
    ///
    /// Fails with [`FilterError::InvalidParameter`] if two landmarks share an identifier or a
    /// landmark position is not finite.
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(landmarks.len());
        for landmark in &landmarks {
            if !landmark.x.is_finite() || !landmark.y.is_finite() {
                return Err(FilterError::InvalidParameter(format!(
                    "landmark {} has a non-finite position",
                    landmark.id
                )));
            }
            if !seen.insert(landmark.id) {
                return Err(FilterError::InvalidParameter(format!(
                    "duplicate landmark id {}",
                    landmark.id
                )));
            }
        }
        Ok(LandmarkMap { landmarks })
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Landmark> {
        self.landmarks.iter()
    }
    /// Look up a landmark by identifier (linear scan).
    pub fn find(&self, id: i32) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.id == id)
    }
}
impl<'a> IntoIterator for &'a LandmarkMap {
    type Item = &'a Landmark;
    type IntoIter = std::slice::Iter<'a, Landmark>;
    fn into_iter(self) -> Self::IntoIter {
        self.landmarks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_construction() {
        let map = LandmarkMap::new(vec![Landmark::new(1, 5.0, 3.0), Landmark::new(2, -1.0, 4.0)])
            .unwrap();
        assert_eq!(map.len(), 2);
        assert!(!map.is_empty());
        assert_eq!(map.get(1).unwrap().id, 2);
        assert_eq!(map.find(1).unwrap().x, 5.0);
        assert!(map.find(7).is_none());
        assert_eq!(map.iter().count(), 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = LandmarkMap::new(vec![Landmark::new(1, 0.0, 0.0), Landmark::new(1, 1.0, 1.0)]);
        assert!(matches!(result, Err(FilterError::InvalidParameter(_))));
    }

    #[test]
    fn test_non_finite_rejected() {
        let result = LandmarkMap::new(vec![Landmark::new(1, f64::NAN, 0.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_map_is_allowed() {
        let map = LandmarkMap::new(Vec::new()).unwrap();
        assert!(map.is_empty());
    }
}
