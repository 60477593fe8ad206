//! Per-tick observation, uncertainty and estimate types.

use serde::{Deserialize, Serialize};

use crate::geometry::Pose2d;
use crate::landmark::LandmarkId;

// ────────────────────────────────────────────────────────────────────────────
// CameraObservation
// ────────────────────────────────────────────────────────────────────────────

/// A single camera's candidate robot pose for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraObservation {
    pub camera: String,
    pub pose: Pose2d,
    /// Capture time of the batch the pose was solved from (seconds).
    pub timestamp_s: f64,
    /// Resolved landmark ids that contributed to the solve.
    pub landmark_ids: Vec<LandmarkId>,
    /// Ambiguity of the best (least ambiguous) landmark.
    pub best_ambiguity: f64,
}

impl CameraObservation {
    pub fn landmark_count(&self) -> usize {
        self.landmark_ids.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// UncertaintyVector
// ────────────────────────────────────────────────────────────────────────────

/// Per-axis measurement standard deviations (x, y in metres; heading in
/// radians).
///
/// Components are positive and finite, except for [`UncertaintyVector::REJECT`]
/// whose squared variance overflows to infinity and so carries zero fusion
/// weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct UncertaintyVector {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl UncertaintyVector {
    /// Near-infinite variance on every axis.
    pub const REJECT: Self = Self {
        x: f64::MAX,
        y: f64::MAX,
        heading: f64::MAX,
    };

    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// Multiply every component by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.heading * factor)
    }

    pub fn is_reject(&self) -> bool {
        *self == Self::REJECT
    }

    /// `true` when every component is positive and finite and the vector is
    /// not [`REJECT`][Self::REJECT].
    pub fn is_valid(&self) -> bool {
        !self.is_reject() && self.as_array().iter().all(|s| s.is_finite() && *s > 0.0)
    }

    /// Inverse-variance weights `[1/σx², 1/σy², 1/σθ²]`.
    pub fn weights(&self) -> [f64; 3] {
        self.as_array().map(|s| 1.0 / (s * s))
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.heading]
    }
}

impl From<[f64; 3]> for UncertaintyVector {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<UncertaintyVector> for [f64; 3] {
    fn from(v: UncertaintyVector) -> Self {
        v.as_array()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fused output
// ────────────────────────────────────────────────────────────────────────────

/// The confidence-weighted global pose produced by one fusion cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalPoseEstimate {
    pub pose: Pose2d,
    pub timestamp_s: f64,
    /// Combined standard deviation per axis (`1/√Σw`).
    pub std_devs: UncertaintyVector,
    /// Every camera that entered the fusion, sorted by id.
    pub cameras: Vec<String>,
    /// Union of the landmark ids used by the contributing cameras, sorted.
    pub landmark_ids: Vec<LandmarkId>,
}

/// What the external pose corrector consumes: a delayed measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisionMeasurement {
    pub pose: Pose2d,
    pub timestamp_s: f64,
    pub std_devs: UncertaintyVector,
}

impl From<&GlobalPoseEstimate> for VisionMeasurement {
    fn from(estimate: &GlobalPoseEstimate) -> Self {
        Self {
            pose: estimate.pose,
            timestamp_s: estimate.timestamp_s,
            std_devs: estimate.std_devs,
        }
    }
}
