//! Sensor seams: the [`CameraDriver`] trait every camera backend implements,
//! plus the dead-reckoning [`ReferencePoseProvider`] / [`PoseCorrector`] pair
//! that the localization loop reads from and feeds back into.

use fieldpose_types::{DetectionBatch, FieldError, Pose2d, VisionMeasurement};

/// A camera + coprocessor pipeline that delivers already-solved landmark
/// detections.
///
/// Backends are chosen at composition time:
/// [`ChannelCamera`][crate::channel::ChannelCamera] for a live driver feed,
/// [`SimCamera`][crate::sim::SimCamera] for headless runs.
pub trait CameraDriver: Send {
    /// Stable identifier for this camera, e.g. `"OV9281_01"`.
    fn id(&self) -> &str;

    /// Drain every batch buffered since the previous call, oldest first.
    ///
    /// Must never block waiting for new data.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::SensorUnavailable`] when the link to the camera
    /// is down.  Callers treat this exactly like an empty queue.
    fn poll_batches(&mut self) -> Result<Vec<DetectionBatch>, FieldError>;
}

/// The continuously-running dead-reckoning tracker, read once per tick as the
/// geometric seed.
pub trait ReferencePoseProvider {
    fn current_pose(&self) -> Pose2d;
}

/// Consumer of fused vision measurements.  How the measurement is blended
/// into the tracker is up to the implementor.
pub trait PoseCorrector {
    fn add_vision_measurement(&mut self, measurement: &VisionMeasurement);
}
