//! Per-camera static configuration and the raw data a camera driver hands
//! over each tick.

use serde::{Deserialize, Serialize};

use crate::geometry::Transform3D;
use crate::landmark::LandmarkId;
use crate::observation::UncertaintyVector;

/// Static description of one physical camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    /// Stable identifier, e.g. `"OV9281_01"`.
    pub id: String,
    /// Pose of the camera in the robot frame.
    pub robot_to_camera: Transform3D,
    /// Base noise used when a single landmark was seen.
    pub single_landmark_std_devs: UncertaintyVector,
    /// Base noise used when several landmarks constrained the solve.
    pub multi_landmark_std_devs: UncertaintyVector,
}

impl CameraConfig {
    /// Default single-landmark noise: `[4, 4, 8]`.
    pub const DEFAULT_SINGLE_STD_DEVS: UncertaintyVector = UncertaintyVector {
        x: 4.0,
        y: 4.0,
        heading: 8.0,
    };

    /// Default multi-landmark noise: `[0.5, 0.5, 1]`.
    pub const DEFAULT_MULTI_STD_DEVS: UncertaintyVector = UncertaintyVector {
        x: 0.5,
        y: 0.5,
        heading: 1.0,
    };

    /// Camera with the default noise vectors.
    pub fn new(id: impl Into<String>, robot_to_camera: Transform3D) -> Self {
        Self {
            id: id.into(),
            robot_to_camera,
            single_landmark_std_devs: Self::DEFAULT_SINGLE_STD_DEVS,
            multi_landmark_std_devs: Self::DEFAULT_MULTI_STD_DEVS,
        }
    }

    pub fn with_std_devs(mut self, single: UncertaintyVector, multi: UncertaintyVector) -> Self {
        self.single_landmark_std_devs = single;
        self.multi_landmark_std_devs = multi;
        self
    }
}

/// One landmark seen in a pipeline result, already solved upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub landmark_id: LandmarkId,
    /// Ratio of reprojection errors between the best and the mirrored solve,
    /// in `[0, 1]`.  Higher means less trustworthy.
    pub ambiguity: f64,
    /// Best solve: pose of the landmark in the camera frame.
    pub camera_to_landmark: Transform3D,
    /// Mirrored alternate solve, when the solver produced one.
    pub alt_camera_to_landmark: Option<Transform3D>,
}

/// An upstream solve that used every landmark in the batch at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLandmarkSolve {
    /// Pose of the camera in the field frame.
    pub field_to_camera: Transform3D,
    pub landmark_ids: Vec<LandmarkId>,
}

/// One pipeline result delivered by a camera driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    /// Capture time on the robot clock (seconds).
    pub timestamp_s: f64,
    /// Pipeline latency reported by the coprocessor (milliseconds).
    pub latency_ms: f64,
    pub detections: Vec<Detection>,
    pub multi_landmark: Option<MultiLandmarkSolve>,
}

/// Read-only per-camera state for dashboards.  Never read back by fusion.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CameraTelemetry {
    pub has_target: bool,
    pub best_landmark_id: Option<LandmarkId>,
    pub latency_ms: f64,
    /// Field pose of the camera derived from the reference pose.
    pub camera_pose: Option<Transform3D>,
    /// Field poses of the resolved landmarks in the latest batch.
    pub visible_landmarks: Vec<Transform3D>,
}
