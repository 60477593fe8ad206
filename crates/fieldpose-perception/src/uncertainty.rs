//! Adaptive measurement noise.
//!
//! The base noise of a camera depends on whether one or several landmarks
//! constrained the solve, and grows quadratically with the average distance
//! to those landmarks:
//!
//! ```text
//! σ = base · (1 + d̄² / divisor)
//! ```
//!
//! A single landmark seen from beyond the range-trust threshold is not
//! trusted at all and receives [`UncertaintyVector::REJECT`].
//!
//! The model is a pure function of its inputs and keeps no state between
//! ticks.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_perception::uncertainty::UncertaintyModel;
//! use fieldpose_types::geometry::{Pose2d, Transform3D, Vec3, Quaternion};
//! use fieldpose_types::{CameraConfig, CameraObservation, Landmark, LandmarkMap};
//!
//! let map = LandmarkMap::new([Landmark {
//!     id: 1,
//!     pose: Transform3D::new(Vec3::new(3.0, 0.0, 0.0), Quaternion::identity()),
//! }])
//! .unwrap();
//! let camera = CameraConfig::new("left", Transform3D::identity());
//! let obs = CameraObservation {
//!     camera: "left".into(),
//!     pose: Pose2d::default(),
//!     timestamp_s: 0.0,
//!     landmark_ids: vec![1],
//!     best_ambiguity: 0.1,
//! };
//!
//! // 3 m away: 4 · (1 + 9/30) = 5.2
//! let sigma = UncertaintyModel::default().estimate(&obs, &camera, &map);
//! assert!((sigma.x - 5.2).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use fieldpose_types::{
    CameraConfig, CameraObservation, FieldError, LandmarkMap, UncertaintyVector, Vec3,
};

/// Parameters of the range-dependent noise model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UncertaintyModel {
    /// Beyond this average distance a single-landmark solve is rejected
    /// (metres).
    pub range_trust_threshold: f64,
    /// Denominator of the quadratic range term.
    pub range_noise_divisor: f64,
}

impl Default for UncertaintyModel {
    fn default() -> Self {
        Self {
            range_trust_threshold: 4.0,
            range_noise_divisor: 30.0,
        }
    }
}

impl UncertaintyModel {
    /// Standard deviations to attach to `obs` when it is fused.
    pub fn estimate(
        &self,
        obs: &CameraObservation,
        camera: &CameraConfig,
        landmarks: &LandmarkMap,
    ) -> UncertaintyVector {
        let candidate = Vec3::new(obs.pose.x, obs.pose.y, 0.0);
        let (count, total) = obs
            .landmark_ids
            .iter()
            .filter_map(|&id| landmarks.lookup(id))
            .fold((0usize, 0.0f64), |(n, sum), landmark| {
                let distance = landmark.translation.planar_distance(candidate);
                (n + 1, sum + distance)
            });

        if count == 0 {
            return camera.single_landmark_std_devs;
        }

        let avg_distance = total / count as f64;

        if count == 1 && avg_distance > self.range_trust_threshold {
            debug!(
                reason = %FieldError::DegenerateRange {
                    camera: obs.camera.clone(),
                    distance: avg_distance,
                },
                "single landmark beyond trusted range"
            );
            return UncertaintyVector::REJECT;
        }

        let base = if count > 1 {
            camera.multi_landmark_std_devs
        } else {
            camera.single_landmark_std_devs
        };
        base.scaled(1.0 + avg_distance * avg_distance / self.range_noise_divisor)
    }
}
