//! Multi-camera Fusion Engine.
//!
//! Combines every accepted camera observation into a single
//! [`GlobalPoseEstimate`] by inverse-variance weighting, independently per
//! axis:
//!
//! ```text
//! w(cam, axis)  = 1 / σ(cam, axis)²
//! fused(axis)   = Σ value(cam, axis) · w(cam, axis) / Σ w(cam, axis)
//! ```
//!
//! Heading is combined according to [`HeadingFusion`]: either as a plain
//! scalar with the same formula, or as the weighted circular mean
//! `atan2(Σ w·sin θ, Σ w·cos θ)`, which stays correct across ±π.
//!
//! A camera carrying [`UncertaintyVector::REJECT`] remains in the
//! bookkeeping but adds no weight.  When no axis has any weight left the
//! engine produces nothing and the caller keeps its previous estimate.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use fieldpose_perception::fusion::{FusionEngine, FusionInput};
//! use fieldpose_types::{CameraObservation, Pose2d, UncertaintyVector};
//!
//! let obs = |camera: &str, x: f64| CameraObservation {
//!     camera: camera.into(),
//!     pose: Pose2d::new(x, 0.0, 0.0),
//!     timestamp_s: 1.0,
//!     landmark_ids: vec![1, 2],
//!     best_ambiguity: 0.0,
//! };
//!
//! let mut input = FusionInput::new();
//! input.insert("left".into(), (obs("left", 0.0), UncertaintyVector::new(1.0, 1.0, 1.0)));
//! input.insert("right".into(), (obs("right", 10.0), UncertaintyVector::new(2.0, 2.0, 2.0)));
//!
//! let fused = FusionEngine::default().fuse(&input).unwrap();
//! assert!((fused.pose.x - 2.0).abs() < 1e-9);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use fieldpose_types::{CameraObservation, GlobalPoseEstimate, Pose2d, UncertaintyVector};

/// Everything fused in one tick, keyed by camera id.
pub type FusionInput = BTreeMap<String, (CameraObservation, UncertaintyVector)>;

/// How headings from several cameras are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingFusion {
    /// Weighted arithmetic mean of the raw angles.  Only valid while every
    /// heading is on the same side of the ±π seam.
    Linear,
    /// Weighted mean of unit vectors.
    #[default]
    Circular,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FusionEngine {
    heading: HeadingFusion,
}

impl FusionEngine {
    pub fn new(heading: HeadingFusion) -> Self {
        Self { heading }
    }

    /// Fuse this tick's accepted observations.
    ///
    /// Returns `None` when `inputs` is empty or every contributor carries zero
    /// weight on some axis.  The estimate is stamped with the earliest capture
    /// time among cameras that are not rejected; among equal times the first
    /// camera id wins.
    pub fn fuse(&self, inputs: &FusionInput) -> Option<GlobalPoseEstimate> {
        // Only cameras that carry weight may stamp the estimate.
        let (_, (first, _)) = inputs
            .iter()
            .filter(|(_, (_, sigma))| !sigma.is_reject())
            .min_by(|(_, (a, _)), (_, (b, _))| a.timestamp_s.total_cmp(&b.timestamp_s))?;

        let mut weighted = [0.0f64; 3];
        let mut total = [0.0f64; 3];
        let (mut sin_sum, mut cos_sum) = (0.0f64, 0.0f64);

        for (camera, (obs, sigma)) in inputs {
            let w = sigma.weights();
            trace!(camera = %camera, x = obs.pose.x, y = obs.pose.y, weight_x = w[0], "fusing camera");
            weighted[0] += obs.pose.x * w[0];
            weighted[1] += obs.pose.y * w[1];
            weighted[2] += obs.pose.heading_rad * w[2];
            let (s, c) = obs.pose.heading_rad.sin_cos();
            sin_sum += s * w[2];
            cos_sum += c * w[2];
            for axis in 0..3 {
                total[axis] += w[axis];
            }
        }

        if total.iter().any(|t| !(t.is_finite() && *t > 0.0)) {
            debug!(cameras = inputs.len(), "no camera carries fusion weight; holding previous estimate");
            return None;
        }

        let heading_rad = match self.heading {
            HeadingFusion::Linear => weighted[2] / total[2],
            HeadingFusion::Circular => sin_sum.atan2(cos_sum),
        };

        let landmark_ids: BTreeSet<u32> = inputs
            .values()
            .flat_map(|(obs, _)| obs.landmark_ids.iter().copied())
            .collect();

        Some(GlobalPoseEstimate {
            pose: Pose2d::new(weighted[0] / total[0], weighted[1] / total[1], heading_rad),
            timestamp_s: first.timestamp_s,
            std_devs: UncertaintyVector::from(total.map(|t| 1.0 / t.sqrt())),
            cameras: inputs.keys().cloned().collect(),
            landmark_ids: landmark_ids.into_iter().collect(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn obs(camera: &str, pose: Pose2d, t: f64, ids: Vec<u32>) -> CameraObservation {
        CameraObservation {
            camera: camera.to_string(),
            pose,
            timestamp_s: t,
            landmark_ids: ids,
            best_ambiguity: 0.05,
        }
    }

    fn sigma(s: f64) -> UncertaintyVector {
        UncertaintyVector::new(s, s, s)
    }

    fn input(entries: Vec<(CameraObservation, UncertaintyVector)>) -> FusionInput {
        entries
            .into_iter()
            .map(|(o, s)| (o.camera.clone(), (o, s)))
            .collect()
    }

    #[test]
    fn empty_input_produces_nothing() {
        assert!(FusionEngine::default().fuse(&FusionInput::new()).is_none());
    }

    #[test]
    fn single_camera_passes_through() {
        let pose = Pose2d::new(1.0, 2.0, 0.3);
        let fused = FusionEngine::default()
            .fuse(&input(vec![(obs("left", pose, 4.0, vec![7]), sigma(0.5))]))
            .unwrap();
        assert!((fused.pose.x - 1.0).abs() < 1e-12);
        assert!((fused.pose.y - 2.0).abs() < 1e-12);
        assert!((fused.pose.heading_rad - 0.3).abs() < 1e-12);
        assert!((fused.std_devs.x - 0.5).abs() < 1e-12);
        assert_eq!(fused.cameras, vec!["left".to_string()]);
    }

    #[test]
    fn inverse_variance_weighting() {
        let fused = FusionEngine::default()
            .fuse(&input(vec![
                (obs("a", Pose2d::new(0.0, 0.0, 0.0), 1.0, vec![1]), sigma(1.0)),
                (obs("b", Pose2d::new(10.0, 0.0, 0.0), 1.0, vec![2]), sigma(2.0)),
            ]))
            .unwrap();
        // (0·1 + 10·0.25) / 1.25
        assert!((fused.pose.x - 2.0).abs() < 1e-12);
        assert!((fused.std_devs.x - 1.0 / 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn axes_are_weighted_independently() {
        let fused = FusionEngine::default()
            .fuse(&input(vec![
                (obs("a", Pose2d::new(0.0, 0.0, 0.0), 1.0, vec![1]), UncertaintyVector::new(1.0, 3.0, 1.0)),
                (obs("b", Pose2d::new(4.0, 4.0, 0.0), 1.0, vec![2]), UncertaintyVector::new(3.0, 1.0, 1.0)),
            ]))
            .unwrap();
        // x leans to a, y leans to b: 4·(1/9)/(1+1/9) = 0.4
        assert!((fused.pose.x - 0.4).abs() < 1e-12);
        assert!((fused.pose.y - 3.6).abs() < 1e-12);
    }

    #[test]
    fn rejected_camera_keeps_bookkeeping_but_no_weight() {
        let fused = FusionEngine::default()
            .fuse(&input(vec![
                (obs("good", Pose2d::new(1.0, 1.0, 0.1), 2.0, vec![1]), sigma(0.5)),
                (obs("far", Pose2d::new(9.0, 9.0, 2.0), 1.0, vec![5]), UncertaintyVector::REJECT),
            ]))
            .unwrap();
        assert!((fused.pose.x - 1.0).abs() < 1e-9);
        assert!((fused.pose.heading_rad - 0.1).abs() < 1e-9);
        assert_eq!(fused.cameras, vec!["far".to_string(), "good".to_string()]);
        assert_eq!(fused.landmark_ids, vec![1, 5]);
    }

    #[test]
    fn only_rejected_cameras_produce_nothing() {
        let fused = FusionEngine::default().fuse(&input(vec![(
            obs("far", Pose2d::new(9.0, 9.0, 2.0), 1.0, vec![5]),
            UncertaintyVector::REJECT,
        )]));
        assert!(fused.is_none());
    }

    #[test]
    fn timestamp_is_earliest_contributor() {
        let fused = FusionEngine::default()
            .fuse(&input(vec![
                (obs("a", Pose2d::default(), 3.0, vec![1]), sigma(1.0)),
                (obs("b", Pose2d::default(), 2.5, vec![2]), sigma(1.0)),
                (obs("c", Pose2d::default(), 2.7, vec![3]), sigma(1.0)),
            ]))
            .unwrap();
        assert!((fused.timestamp_s - 2.5).abs() < 1e-12);
    }

    #[test]
    fn rejected_camera_does_not_stamp_the_estimate() {
        let fused = FusionEngine::default()
            .fuse(&input(vec![
                (obs("good", Pose2d::new(1.0, 0.0, 0.0), 2.0, vec![1]), sigma(0.5)),
                (obs("far", Pose2d::new(9.0, 0.0, 0.0), 1.0, vec![5]), UncertaintyVector::REJECT),
            ]))
            .unwrap();
        assert!((fused.pose.x - 1.0).abs() < 1e-9);
        assert!((fused.timestamp_s - 2.0).abs() < 1e-12);
        assert_eq!(fused.cameras, vec!["far".to_string(), "good".to_string()]);
        assert_eq!(fused.landmark_ids, vec![1, 5]);
    }

    #[test]
    fn circular_heading_handles_wraparound() {
        let fused = FusionEngine::new(HeadingFusion::Circular)
            .fuse(&input(vec![
                (obs("a", Pose2d::new(0.0, 0.0, PI - 0.1), 1.0, vec![1]), sigma(1.0)),
                (obs("b", Pose2d::new(0.0, 0.0, -PI + 0.1), 1.0, vec![2]), sigma(1.0)),
            ]))
            .unwrap();
        assert!((fused.pose.heading_rad.abs() - PI).abs() < 1e-9);
    }

    #[test]
    fn linear_heading_matches_scalar_average() {
        let fused = FusionEngine::new(HeadingFusion::Linear)
            .fuse(&input(vec![
                (obs("a", Pose2d::new(0.0, 0.0, PI - 0.1), 1.0, vec![1]), sigma(1.0)),
                (obs("b", Pose2d::new(0.0, 0.0, -PI + 0.1), 1.0, vec![2]), sigma(1.0)),
            ]))
            .unwrap();
        assert!(fused.pose.heading_rad.abs() < 1e-9);
    }

    #[test]
    fn circular_and_linear_agree_for_small_spread() {
        let entries = vec![
            (obs("a", Pose2d::new(0.0, 0.0, 0.10), 1.0, vec![1]), sigma(1.0)),
            (obs("b", Pose2d::new(0.0, 0.0, 0.12), 1.0, vec![2]), sigma(2.0)),
        ];
        let linear = FusionEngine::new(HeadingFusion::Linear).fuse(&input(entries.clone())).unwrap();
        let circular = FusionEngine::new(HeadingFusion::Circular).fuse(&input(entries)).unwrap();
        assert!((linear.pose.heading_rad - circular.pose.heading_rad).abs() < 1e-4);
    }
}
