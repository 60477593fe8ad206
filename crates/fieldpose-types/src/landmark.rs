//! [`LandmarkMap`] – static registry of fiducial landmarks on the field.
//!
//! The map is built once at startup from configuration and is read-only for
//! the rest of the process.  Every fusion tick queries it to resolve the
//! field pose of each detected landmark id.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_types::geometry::{Transform3D, Vec3, Quaternion};
//! use fieldpose_types::landmark::{Landmark, LandmarkMap};
//!
//! let map = LandmarkMap::new(vec![Landmark {
//!     id: 7,
//!     pose: Transform3D::new(Vec3::new(4.0, 2.0, 0.3), Quaternion::identity()),
//! }])
//! .unwrap();
//!
//! assert!(map.lookup(7).is_some());
//! assert!(map.lookup(8).is_none());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Transform3D;
use crate::FieldError;

/// Identifier printed on a fiducial marker.
pub type LandmarkId = u32;

/// A fixed reference feature at a known field pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: LandmarkId,
    /// Pose of the landmark in the field frame.
    pub pose: Transform3D,
}

/// Immutable id → pose lookup table.
#[derive(Debug, Clone, Default)]
pub struct LandmarkMap {
    landmarks: HashMap<LandmarkId, Transform3D>,
}

impl LandmarkMap {
    /// Build the map from a list of landmarks.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Config`] if two landmarks share an id.
    pub fn new(landmarks: impl IntoIterator<Item = Landmark>) -> Result<Self, FieldError> {
        let mut map = HashMap::new();
        for landmark in landmarks {
            if map.insert(landmark.id, landmark.pose).is_some() {
                return Err(FieldError::Config(format!(
                    "landmark {} is defined more than once",
                    landmark.id
                )));
            }
        }
        Ok(Self { landmarks: map })
    }

    /// Field pose of landmark `id`, or `None` if it is not registered.
    pub fn lookup(&self, id: LandmarkId) -> Option<&Transform3D> {
        self.landmarks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Iterate over every registered landmark in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = Landmark> + '_ {
        self.landmarks
            .iter()
            .map(|(&id, &pose)| Landmark { id, pose })
    }
}
