//! [`LocalizationService`] – one vision fusion cycle per control tick.
//!
//! Each call to [`LocalizationService::tick`] runs the whole pipeline
//! synchronously:
//!
//! ```text
//! reference pose ─┐
//!                 ▼
//! CameraAdapter ×N ─► ObservationFilter ─► UncertaintyModel ─► FusionEngine
//!                                                                   │
//!                               latest estimate (stale-hold) ◄──────┘
//! ```
//!
//! Nothing in the cycle is fallible: a missing landmark, an ambiguous solve,
//! a far single landmark or a dead camera only reduce what reaches fusion.
//! When nothing does, the previous estimate is kept untouched.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_hal::sim::{SimDriveBase, SimProperties, SimVisionSystem};
//! use fieldpose_hal::CameraAdapter;
//! use fieldpose_runtime::{LocalizationConfig, LocalizationService};
//! use fieldpose_types::geometry::{Pose2d, Quaternion, Transform3D, Vec3};
//! use fieldpose_types::{CameraConfig, Landmark, LandmarkMap};
//!
//! let map = LandmarkMap::new([Landmark {
//!     id: 1,
//!     pose: Transform3D::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::from_yaw(std::f64::consts::PI)),
//! }])
//! .unwrap();
//!
//! let mut sim = SimVisionSystem::new(map.clone(), SimProperties::default());
//! let camera = CameraConfig::new("front", Transform3D::identity());
//! let driver = sim.add_camera(camera.clone());
//!
//! let mut service = LocalizationService::new(
//!     &LocalizationConfig::default(),
//!     map,
//!     vec![CameraAdapter::new(camera, Box::new(driver))],
//! );
//!
//! let robot = SimDriveBase::new(Pose2d::new(0.5, 0.0, 0.0));
//! sim.update(Pose2d::new(0.5, 0.0, 0.0), 1.0);
//!
//! let measurement = service.tick(&robot).unwrap();
//! assert!((measurement.pose.x - 0.5).abs() < 1e-9);
//! assert!(service.latest_global_estimate().is_some());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace};

use fieldpose_hal::{CameraAdapter, FallbackStrategy, ReferencePoseProvider};
use fieldpose_perception::filter::DEFAULT_MAX_AMBIGUITY;
use fieldpose_perception::{FusionEngine, FusionInput, HeadingFusion, ObservationFilter, UncertaintyModel};
use fieldpose_types::{
    CameraObservation, CameraTelemetry, FieldError, GlobalPoseEstimate, LandmarkMap,
    VisionMeasurement,
};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables of the fusion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Single-landmark observations above this ambiguity are discarded.
    pub max_ambiguity: f64,
    #[serde(flatten)]
    pub uncertainty: UncertaintyModel,
    pub heading_fusion: HeadingFusion,
    pub fallback_strategy: FallbackStrategy,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            max_ambiguity: DEFAULT_MAX_AMBIGUITY,
            uncertainty: UncertaintyModel::default(),
            heading_fusion: HeadingFusion::default(),
            fallback_strategy: FallbackStrategy::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LocalizationService
// ────────────────────────────────────────────────────────────────────────────

/// Owns the camera table and the only state that survives between ticks:
/// the latest fused estimate and each camera's last observation.
pub struct LocalizationService {
    landmarks: LandmarkMap,
    cameras: Vec<CameraAdapter>,
    filter: ObservationFilter,
    uncertainty: UncertaintyModel,
    fusion: FusionEngine,
    latest: Option<GlobalPoseEstimate>,
    last_seen: HashMap<String, CameraObservation>,
    ticks: u64,
}

impl LocalizationService {
    /// Every adapter solves single landmarks with `config.fallback_strategy`,
    /// whatever strategy it carried before.
    pub fn new(config: &LocalizationConfig, landmarks: LandmarkMap, mut cameras: Vec<CameraAdapter>) -> Self {
        for camera in &mut cameras {
            camera.set_strategy(config.fallback_strategy);
        }
        Self {
            landmarks,
            cameras,
            filter: ObservationFilter::new(config.max_ambiguity),
            uncertainty: config.uncertainty,
            fusion: FusionEngine::new(config.heading_fusion),
            latest: None,
            last_seen: HashMap::new(),
            ticks: 0,
        }
    }

    /// Run one fusion cycle against the tracker's current pose.
    ///
    /// Returns the new measurement for the pose corrector, or `None` when no
    /// camera contributed this tick.
    pub fn tick(&mut self, reference: &dyn ReferencePoseProvider) -> Option<VisionMeasurement> {
        self.ticks += 1;
        let _span = debug_span!("localization_tick", tick = self.ticks).entered();

        let seed = reference.current_pose();
        let mut accepted = FusionInput::new();

        for camera in &mut self.cameras {
            let Some(obs) = camera.poll(&self.landmarks, seed) else {
                continue;
            };
            self.last_seen.insert(obs.camera.clone(), obs.clone());

            if let Err(reason) = self.filter.check(&obs) {
                debug!(%reason, "observation filtered");
                continue;
            }

            let sigma = self.uncertainty.estimate(&obs, camera.config(), &self.landmarks);
            trace!(camera = %obs.camera, sigma_x = sigma.x, sigma_heading = sigma.heading, "accepted observation");
            accepted.insert(obs.camera.clone(), (obs, sigma));
        }

        if accepted.is_empty() {
            trace!(reason = %FieldError::NoValidCameras, "holding previous estimate");
            return None;
        }

        let estimate = self.fusion.fuse(&accepted)?;
        debug!(
            x = estimate.pose.x,
            y = estimate.pose.y,
            heading = estimate.pose.heading_rad,
            cameras = estimate.cameras.len(),
            "fused global pose"
        );
        let measurement = VisionMeasurement::from(&estimate);
        self.latest = Some(estimate);
        Some(measurement)
    }

    /// The most recent fused estimate, held across ticks without input.
    pub fn latest_global_estimate(&self) -> Option<VisionMeasurement> {
        self.latest.as_ref().map(VisionMeasurement::from)
    }

    /// Full metadata of the most recent fused estimate.
    pub fn latest_estimate(&self) -> Option<&GlobalPoseEstimate> {
        self.latest.as_ref()
    }

    pub fn telemetry(&self, camera_id: &str) -> Option<&CameraTelemetry> {
        self.cameras
            .iter()
            .find(|c| c.id() == camera_id)
            .map(CameraAdapter::telemetry)
    }

    /// The last observation `camera_id` produced, accepted or not.
    pub fn last_seen(&self, camera_id: &str) -> Option<&CameraObservation> {
        self.last_seen.get(camera_id)
    }

    pub fn camera_ids(&self) -> impl Iterator<Item = &str> {
        self.cameras.iter().map(CameraAdapter::id)
    }

    pub fn landmarks(&self) -> &LandmarkMap {
        &self.landmarks
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fieldpose_hal::ChannelCamera;
    use fieldpose_types::geometry::{Pose2d, Quaternion, Transform3D, Vec3};
    use fieldpose_types::{CameraConfig, Detection, DetectionBatch, Landmark};
    use std::f64::consts::PI;
    use tokio::sync::mpsc::UnboundedSender;

    struct Seed(Pose2d);

    impl ReferencePoseProvider for Seed {
        fn current_pose(&self) -> Pose2d {
            self.0
        }
    }

    fn map() -> LandmarkMap {
        LandmarkMap::new([
            Landmark {
                id: 1,
                pose: Transform3D::new(Vec3::new(2.0, 0.0, 0.3), Quaternion::from_yaw(PI)),
            },
            Landmark {
                id: 2,
                pose: Transform3D::new(Vec3::new(5.0, 0.0, 0.3), Quaternion::from_yaw(PI)),
            },
        ])
        .unwrap()
    }

    fn service(ids: &[&str]) -> (LocalizationService, Vec<UnboundedSender<DetectionBatch>>) {
        service_with(&LocalizationConfig::default(), ids)
    }

    fn service_with(
        config: &LocalizationConfig,
        ids: &[&str],
    ) -> (LocalizationService, Vec<UnboundedSender<DetectionBatch>>) {
        let mut adapters = Vec::new();
        let mut feeds = Vec::new();
        for id in ids {
            let (driver, tx) = ChannelCamera::new(*id);
            adapters.push(CameraAdapter::new(
                CameraConfig::new(*id, Transform3D::identity()),
                Box::new(driver),
            ));
            feeds.push(tx);
        }
        (LocalizationService::new(config, map(), adapters), feeds)
    }

    fn seen_from(robot: Pose2d, id: u32, ambiguity: f64) -> Detection {
        let landmark = *map().lookup(id).unwrap();
        Detection {
            landmark_id: id,
            ambiguity,
            camera_to_landmark: Transform3D::from_pose2d(robot).inverse().compose(landmark),
            alt_camera_to_landmark: None,
        }
    }

    fn batch(t: f64, detections: Vec<Detection>) -> DetectionBatch {
        DetectionBatch {
            timestamp_s: t,
            latency_ms: 20.0,
            detections,
            multi_landmark: None,
        }
    }

    #[test]
    fn no_cameras_no_estimate() {
        let (mut svc, _) = service(&[]);
        assert!(svc.tick(&Seed(Pose2d::default())).is_none());
        assert!(svc.latest_global_estimate().is_none());
    }

    #[test]
    fn stale_hold_keeps_previous_estimate() {
        let (mut svc, feeds) = service(&["left"]);
        let robot = Pose2d::new(0.5, 0.0, 0.0);
        feeds[0].send(batch(1.0, vec![seen_from(robot, 1, 0.05)])).unwrap();

        let first = svc.tick(&Seed(robot)).unwrap();
        assert!((first.pose.x - 0.5).abs() < 1e-9);

        // Nothing buffered on the next tick.
        assert!(svc.tick(&Seed(robot)).is_none());
        assert_eq!(svc.latest_global_estimate(), Some(first));
        assert_eq!(svc.ticks(), 2);
    }

    #[test]
    fn ambiguous_single_landmark_never_reaches_fusion() {
        let (mut svc, feeds) = service(&["left"]);
        let robot = Pose2d::new(0.5, 0.0, 0.0);
        feeds[0].send(batch(1.0, vec![seen_from(robot, 1, 0.3)])).unwrap();

        assert!(svc.tick(&Seed(robot)).is_none());
        assert!(svc.latest_global_estimate().is_none());
        // Still cached for display.
        assert!(svc.last_seen("left").is_some());
        assert_eq!(svc.telemetry("left").unwrap().best_landmark_id, Some(1));
    }

    #[test]
    fn far_single_landmark_holds_previous_estimate() {
        let (mut svc, feeds) = service(&["left"]);
        let near = Pose2d::new(0.5, 0.0, 0.0);
        feeds[0].send(batch(1.0, vec![seen_from(near, 1, 0.1)])).unwrap();
        let held = svc.tick(&Seed(near)).unwrap();

        // Landmark 2 seen from x = 0 is 5 m away: rejected sentinel, no weight.
        let far = Pose2d::new(0.0, 0.0, 0.0);
        feeds[0].send(batch(2.0, vec![seen_from(far, 2, 0.1)])).unwrap();
        assert!(svc.tick(&Seed(far)).is_none());
        assert_eq!(svc.latest_global_estimate(), Some(held));
    }

    #[test]
    fn two_cameras_are_fused() {
        let (mut svc, feeds) = service(&["left", "right"]);
        let robot = Pose2d::new(0.5, 0.2, 0.05);
        feeds[0].send(batch(3.0, vec![seen_from(robot, 1, 0.05)])).unwrap();
        feeds[1].send(batch(2.9, vec![seen_from(robot, 1, 0.05)])).unwrap();

        let m = svc.tick(&Seed(robot)).unwrap();
        assert!((m.pose.x - 0.5).abs() < 1e-9);
        assert!((m.pose.y - 0.2).abs() < 1e-9);
        assert!((m.timestamp_s - 2.9).abs() < 1e-12);

        let est = svc.latest_estimate().unwrap();
        assert_eq!(est.cameras, vec!["left".to_string(), "right".to_string()]);
    }

    #[test]
    fn configured_strategy_reaches_every_camera() {
        let truth = Pose2d::new(0.5, 0.1, 0.0);
        let mirrored = Pose2d::new(0.9, -0.4, 0.3);
        let flip = |mut d: Detection| {
            d.alt_camera_to_landmark = Some(seen_from(truth, 1, 0.1).camera_to_landmark);
            d
        };

        let (mut lowest, feeds) = service(&["left"]);
        feeds[0].send(batch(1.0, vec![flip(seen_from(mirrored, 1, 0.1))])).unwrap();
        let m = lowest.tick(&Seed(truth)).unwrap();
        assert!(m.pose.distance_to(&mirrored) < 1e-9);

        let config = LocalizationConfig {
            fallback_strategy: FallbackStrategy::ClosestToReference,
            ..LocalizationConfig::default()
        };
        let (mut closest, feeds) = service_with(&config, &["left", "right"]);
        for feed in &feeds {
            feed.send(batch(1.0, vec![flip(seen_from(mirrored, 1, 0.1))])).unwrap();
        }
        let m = closest.tick(&Seed(truth)).unwrap();
        assert!(m.pose.distance_to(&truth) < 1e-9);
        assert!((m.pose.heading_rad - truth.heading_rad).abs() < 1e-9);
        assert_eq!(closest.latest_estimate().unwrap().cameras.len(), 2);
    }

    #[test]
    fn camera_ids_follow_the_table() {
        let (svc, _) = service(&["a", "b", "c"]);
        assert_eq!(svc.camera_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(svc.telemetry("z").is_none());
        assert_eq!(svc.landmarks().len(), 2);
    }
}
