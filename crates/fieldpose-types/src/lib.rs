//! `fieldpose-types` – shared vocabulary of the FieldPose workspace.
//!
//! # Modules
//!
//! - [`geometry`] – [`Vec3`], [`Quaternion`], [`Transform3D`] and the planar
//!   [`Pose2d`] that fusion works on.
//! - [`landmark`] – [`LandmarkMap`]: static id → field pose registry.
//! - [`camera`] – [`CameraConfig`], the raw [`DetectionBatch`] a driver
//!   delivers, and read-only [`CameraTelemetry`].
//! - [`observation`] – per-tick [`CameraObservation`], [`UncertaintyVector`],
//!   and the fused [`GlobalPoseEstimate`].

pub mod camera;
pub mod geometry;
pub mod landmark;
pub mod observation;

use thiserror::Error;

pub use camera::{CameraConfig, CameraTelemetry, Detection, DetectionBatch, MultiLandmarkSolve};
pub use geometry::{Pose2d, Quaternion, Transform3D, Vec3};
pub use landmark::{Landmark, LandmarkId, LandmarkMap};
pub use observation::{CameraObservation, GlobalPoseEstimate, UncertaintyVector, VisionMeasurement};

/// Every way a fusion input can be unusable, plus configuration failures.
///
/// Only [`FieldError::Config`] ever leaves the localization layer; the other
/// variants are absorbed inside a tick and surface as log events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Missing Landmark: id {id} is not in the field layout")]
    MissingLandmark { id: LandmarkId },

    #[error("Ambiguous Single Landmark on {camera}: ambiguity {ambiguity:.3}")]
    AmbiguousSingleLandmark { camera: String, ambiguity: f64 },

    #[error("Degenerate Range on {camera}: single landmark at {distance:.2} m")]
    DegenerateRange { camera: String, distance: f64 },

    #[error("No Valid Cameras this tick")]
    NoValidCameras,

    #[error("Sensor Unavailable on {camera}: {details}")]
    SensorUnavailable { camera: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),
}
