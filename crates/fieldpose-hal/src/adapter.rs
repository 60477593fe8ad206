//! [`CameraAdapter`] – turns one camera's buffered detection batches into a
//! candidate robot pose.
//!
//! Each tick the adapter:
//!
//! 1. drains the driver without blocking (a link failure counts as "no
//!    data"),
//! 2. keeps only the newest batch by capture timestamp,
//! 3. drops detections of landmarks missing from the [`LandmarkMap`],
//! 4. solves the robot pose, preferring the upstream multi-landmark solve
//!    when at least two landmarks resolved and otherwise falling back to a
//!    single detection per [`FallbackStrategy`],
//! 5. removes the camera's mounting offset, and
//! 6. refreshes the read-only [`CameraTelemetry`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use fieldpose_types::{
    CameraConfig, CameraObservation, CameraTelemetry, Detection, DetectionBatch, FieldError,
    LandmarkMap, Pose2d, Transform3D,
};

use crate::camera::CameraDriver;

/// How to solve a batch when no multi-landmark solve applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Use the best solve of the least ambiguous detection.
    #[default]
    LowestAmbiguity,
    /// Consider the best and alternate solve of every detection and keep the
    /// robot pose closest to the reference pose.
    ClosestToReference,
}

/// Per-camera sensor adapter.  One instance per physical camera.
pub struct CameraAdapter {
    config: CameraConfig,
    driver: Box<dyn CameraDriver>,
    strategy: FallbackStrategy,
    telemetry: CameraTelemetry,
}

impl CameraAdapter {
    pub fn new(config: CameraConfig, driver: Box<dyn CameraDriver>) -> Self {
        if config.id != driver.id() {
            debug!(camera = %config.id, driver = %driver.id(), "camera id differs from driver id");
        }
        Self {
            config,
            driver,
            strategy: FallbackStrategy::default(),
            telemetry: CameraTelemetry::default(),
        }
    }

    pub fn set_strategy(&mut self, strategy: FallbackStrategy) {
        self.strategy = strategy;
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &CameraTelemetry {
        &self.telemetry
    }

    /// Produce this tick's candidate observation, or `None` when the camera
    /// has nothing usable.
    pub fn poll(&mut self, landmarks: &LandmarkMap, reference: Pose2d) -> Option<CameraObservation> {
        let robot_to_camera = self.config.robot_to_camera;
        self.telemetry.camera_pose =
            Some(Transform3D::from_pose2d(reference).compose(robot_to_camera));

        let batches = match self.driver.poll_batches() {
            Ok(batches) => batches,
            Err(e) => {
                debug!(camera = %self.config.id, error = %e, "camera unavailable; treating as no detections");
                Vec::new()
            }
        };

        let Some(batch) = newest(batches) else {
            self.clear_targets();
            return None;
        };
        self.telemetry.latency_ms = batch.latency_ms;

        let resolved: Vec<(Detection, Transform3D)> = batch
            .detections
            .iter()
            .filter_map(|d| match landmarks.lookup(d.landmark_id) {
                Some(pose) => Some((*d, *pose)),
                None => {
                    trace!(
                        camera = %self.config.id,
                        reason = %FieldError::MissingLandmark { id: d.landmark_id },
                        "dropping detection"
                    );
                    None
                }
            })
            .collect();

        let Some(best) = resolved
            .iter()
            .min_by(|a, b| a.0.ambiguity.total_cmp(&b.0.ambiguity))
            .copied()
        else {
            self.clear_targets();
            return None;
        };

        self.telemetry.has_target = true;
        self.telemetry.best_landmark_id = Some(best.0.landmark_id);
        self.telemetry.visible_landmarks = resolved.iter().map(|(_, pose)| *pose).collect();

        let field_to_robot = self.solve(&batch, &resolved, best, reference);

        Some(CameraObservation {
            camera: self.config.id.clone(),
            pose: field_to_robot.to_pose2d(),
            timestamp_s: batch.timestamp_s,
            landmark_ids: resolved.iter().map(|(d, _)| d.landmark_id).collect(),
            best_ambiguity: best.0.ambiguity,
        })
    }

    fn solve(
        &self,
        batch: &DetectionBatch,
        resolved: &[(Detection, Transform3D)],
        (best, best_landmark): (Detection, Transform3D),
        reference: Pose2d,
    ) -> Transform3D {
        let camera_to_robot = self.config.robot_to_camera.inverse();

        if resolved.len() > 1
            && let Some(multi) = &batch.multi_landmark
        {
            return multi.field_to_camera.compose(camera_to_robot);
        }

        let from_landmark = |landmark: Transform3D, camera_to_landmark: Transform3D| {
            landmark
                .compose(camera_to_landmark.inverse())
                .compose(camera_to_robot)
        };

        let lowest_ambiguity = from_landmark(best_landmark, best.camera_to_landmark);
        match self.strategy {
            FallbackStrategy::LowestAmbiguity => lowest_ambiguity,
            // Ties keep the lowest-ambiguity solve.
            FallbackStrategy::ClosestToReference => resolved
                .iter()
                .flat_map(|(d, landmark)| {
                    std::iter::once(d.camera_to_landmark)
                        .chain(d.alt_camera_to_landmark)
                        .map(move |c| from_landmark(*landmark, c))
                })
                .fold(lowest_ambiguity, |kept, candidate| {
                    let distance = |t: &Transform3D| t.to_pose2d().distance_to(&reference);
                    if distance(&candidate) < distance(&kept) { candidate } else { kept }
                }),
        }
    }

    fn clear_targets(&mut self) {
        self.telemetry.has_target = false;
        self.telemetry.best_landmark_id = None;
        self.telemetry.visible_landmarks.clear();
    }
}

/// The batch with the latest capture time; on ties the one delivered last.
fn newest(batches: Vec<DetectionBatch>) -> Option<DetectionBatch> {
    batches
        .into_iter()
        .max_by(|a, b| a.timestamp_s.total_cmp(&b.timestamp_s))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
