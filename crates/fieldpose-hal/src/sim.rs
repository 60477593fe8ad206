//! In-process vision simulation for CI and headless runs.
//!
//! [`SimVisionSystem`] renders landmark detections for every registered
//! [`SimCamera`] from a ground-truth robot pose, honouring each camera's
//! mounting transform, field of view and range limit.  Calibration error,
//! latency jitter and a frame-rate cap are off by default, so the default
//! output is exact; when enabled they draw from a seeded generator and a
//! run is reproducible.  [`SimDriveBase`] stands in for the dead-reckoning
//! tracker.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_hal::camera::CameraDriver;
//! use fieldpose_hal::sim::{SimProperties, SimVisionSystem};
//! use fieldpose_types::geometry::{Pose2d, Quaternion, Transform3D, Vec3};
//! use fieldpose_types::{CameraConfig, Landmark, LandmarkMap};
//!
//! // A landmark 2 m ahead of the origin, facing back towards it.
//! let map = LandmarkMap::new([Landmark {
//!     id: 1,
//!     pose: Transform3D::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::from_yaw(std::f64::consts::PI)),
//! }])
//! .unwrap();
//!
//! let mut sim = SimVisionSystem::new(map, SimProperties::default());
//! let mut camera = sim.add_camera(CameraConfig::new("front", Transform3D::identity()));
//!
//! sim.update(Pose2d::new(0.0, 0.0, 0.0), 1.0);
//! let batches = camera.poll_batches().unwrap();
//! assert_eq!(batches[0].detections[0].landmark_id, 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::trace;

use fieldpose_types::{
    CameraConfig, Detection, DetectionBatch, FieldError, LandmarkMap, MultiLandmarkSolve,
    Pose2d, Transform3D, VisionMeasurement,
};
use fieldpose_types::geometry::{Quaternion, Vec3};

use crate::camera::{CameraDriver, PoseCorrector, ReferencePoseProvider};

// ────────────────────────────────────────────────────────────────────────────
// Properties
// ────────────────────────────────────────────────────────────────────────────

/// Optical and pipeline characteristics shared by every simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimProperties {
    pub horizontal_fov_deg: f64,
    pub vertical_fov_deg: f64,
    /// Landmarks further than this from the lens are not detected (metres).
    pub max_range_m: f64,
    /// Pipeline latency; batches are stamped `now - latency`.
    pub latency_ms: f64,
    /// Ambiguity reported for every detection.
    pub ambiguity: f64,
    /// Sensor width; converts pixel error into bearing error.
    pub resolution_width_px: f64,
    /// Mean and spread of the per-detection reprojection error (pixels).
    /// Both zero disables calibration error.
    pub calib_error_px: f64,
    pub calib_error_std_dev_px: f64,
    /// Standard deviation of the pipeline latency.  Zero stamps every batch
    /// with exactly `latency_ms`.
    pub latency_std_dev_ms: f64,
    /// Frames per second each camera produces.  Zero renders on every
    /// [`SimVisionSystem::update`].
    pub fps: f64,
    /// Seed of the noise generator.
    pub seed: u64,
}

impl Default for SimProperties {
    fn default() -> Self {
        Self {
            horizontal_fov_deg: 100.0,
            vertical_fov_deg: 75.0,
            max_range_m: 6.0,
            latency_ms: 35.0,
            ambiguity: 0.05,
            resolution_width_px: 960.0,
            calib_error_px: 0.0,
            calib_error_std_dev_px: 0.0,
            latency_std_dev_ms: 0.0,
            fps: 0.0,
            seed: 1,
        }
    }
}

impl SimProperties {
    /// The competition camera profile: 0.25 px mean calibration error with
    /// 0.08 px spread, 35 ± 5 ms latency at 30 FPS.
    pub fn competition() -> Self {
        Self {
            calib_error_px: 0.25,
            calib_error_std_dev_px: 0.08,
            latency_std_dev_ms: 5.0,
            fps: 30.0,
            ..Self::default()
        }
    }

    fn has_calib_error(&self) -> bool {
        self.calib_error_px != 0.0 || self.calib_error_std_dev_px != 0.0
    }

    fn frame_period_s(&self) -> Option<f64> {
        (self.fps.is_finite() && self.fps > 0.0).then(|| 1.0 / self.fps)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Noise
// ────────────────────────────────────────────────────────────────────────────

/// xorshift64* with Box-Muller gaussians.
#[derive(Debug, Clone)]
struct SimNoise {
    state: u64,
}

impl SimNoise {
    fn new(seed: u64) -> Self {
        // A zero state never leaves zero.
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in `(0, 1]`.
    fn uniform(&mut self) -> f64 {
        ((self.next_u64() >> 11) + 1) as f64 / (1u64 << 53) as f64
    }

    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        let radius = (-2.0 * self.uniform().ln()).sqrt();
        let angle = std::f64::consts::TAU * self.uniform();
        mean + std_dev * radius * angle.cos()
    }

    /// A small camera-frame rotation whose bearing error is drawn from the
    /// calibration error, in a uniformly random direction.
    fn calib_rotation(&mut self, properties: &SimProperties) -> Transform3D {
        let rad_per_px = properties.horizontal_fov_deg.to_radians()
            / properties.resolution_width_px.max(1.0);
        let error_px = self
            .gaussian(properties.calib_error_px, properties.calib_error_std_dev_px)
            .abs();
        let direction = std::f64::consts::TAU * self.uniform();
        let bearing = error_px * rad_per_px;
        Transform3D::new(
            Vec3::zero(),
            Quaternion::from_euler(0.0, bearing * direction.sin(), bearing * direction.cos()),
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimCamera
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimQueue {
    batches: VecDeque<DetectionBatch>,
    connected: bool,
}

/// Receiving end of a simulated camera.  Batches are produced by
/// [`SimVisionSystem::update`].
pub struct SimCamera {
    id: String,
    queue: Arc<Mutex<SimQueue>>,
}

impl CameraDriver for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll_batches(&mut self) -> Result<Vec<DetectionBatch>, FieldError> {
        let mut queue = self.queue.lock().map_err(|_| FieldError::SensorUnavailable {
            camera: self.id.clone(),
            details: "simulated queue poisoned".to_string(),
        })?;
        if !queue.connected {
            return Err(FieldError::SensorUnavailable {
                camera: self.id.clone(),
                details: "simulated link down".to_string(),
            });
        }
        Ok(queue.batches.drain(..).collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimVisionSystem
// ────────────────────────────────────────────────────────────────────────────

struct SimCameraEntry {
    config: CameraConfig,
    queue: Arc<Mutex<SimQueue>>,
    /// Earliest time the next frame may be rendered.
    next_frame_s: Option<f64>,
}

impl SimCameraEntry {
    /// Whether a frame is due at `now_s`, advancing the frame clock if so.
    fn frame_due(&mut self, period_s: Option<f64>, now_s: f64) -> bool {
        let Some(period) = period_s else {
            return true;
        };
        if let Some(next) = self.next_frame_s
            && now_s + 1e-9 < next
        {
            return false;
        }
        // Stay on the frame grid unless updates fell a whole period behind.
        let next = self.next_frame_s.unwrap_or(now_s) + period;
        self.next_frame_s = Some(if next > now_s { next } else { now_s + period });
        true
    }
}

/// Renders detections for every simulated camera from a ground-truth pose.
pub struct SimVisionSystem {
    landmarks: LandmarkMap,
    properties: SimProperties,
    cameras: Vec<SimCameraEntry>,
    noise: SimNoise,
}

impl SimVisionSystem {
    pub fn new(landmarks: LandmarkMap, properties: SimProperties) -> Self {
        Self {
            landmarks,
            properties,
            cameras: Vec::new(),
            noise: SimNoise::new(properties.seed),
        }
    }

    /// Register a camera and return the driver the localization loop polls.
    pub fn add_camera(&mut self, config: CameraConfig) -> SimCamera {
        let queue = Arc::new(Mutex::new(SimQueue {
            batches: VecDeque::new(),
            connected: true,
        }));
        let camera = SimCamera {
            id: config.id.clone(),
            queue: Arc::clone(&queue),
        };
        self.cameras.push(SimCameraEntry {
            config,
            queue,
            next_frame_s: None,
        });
        camera
    }

    /// Simulate the link to `camera_id` going down or coming back.  While
    /// disconnected the camera neither buffers nor delivers batches.
    pub fn set_connected(&mut self, camera_id: &str, connected: bool) {
        for entry in self.cameras.iter().filter(|e| e.config.id == camera_id) {
            if let Ok(mut queue) = entry.queue.lock() {
                queue.connected = connected;
                if !connected {
                    queue.batches.clear();
                }
            }
        }
    }

    /// Render one frame for every camera as seen from `truth` at time
    /// `now_s`.  Cameras that see no landmark still receive an empty batch;
    /// cameras whose next frame is not yet due receive nothing.
    pub fn update(&mut self, truth: Pose2d, now_s: f64) {
        let robot = Transform3D::from_pose2d(truth);
        let period = self.properties.frame_period_s();
        for entry in &mut self.cameras {
            if !entry.frame_due(period, now_s) {
                trace!(camera = %entry.config.id, "no frame due");
                continue;
            }
            let batch = render(
                &self.landmarks,
                &self.properties,
                &mut self.noise,
                robot.compose(entry.config.robot_to_camera),
                now_s,
            );
            trace!(
                camera = %entry.config.id,
                detections = batch.detections.len(),
                "rendered simulated frame"
            );
            if let Ok(mut queue) = entry.queue.lock()
                && queue.connected
            {
                queue.batches.push_back(batch);
            }
        }
    }
}

fn render(
    landmarks: &LandmarkMap,
    properties: &SimProperties,
    noise: &mut SimNoise,
    field_to_camera: Transform3D,
    now_s: f64,
) -> DetectionBatch {
    let camera_to_field = field_to_camera.inverse();
    let half_h = (properties.horizontal_fov_deg * 0.5).to_radians();
    let half_v = (properties.vertical_fov_deg * 0.5).to_radians();

    let visible: Vec<_> = landmarks
        .iter()
        .filter_map(|landmark| {
            let camera_to_landmark = camera_to_field.compose(landmark.pose);
            let t = camera_to_landmark.translation;
            let range = (t.x * t.x + t.y * t.y + t.z * t.z).sqrt();
            // Optical axis is +X of the camera frame.
            let in_view = t.x > 0.0
                && range <= properties.max_range_m
                && t.y.atan2(t.x).abs() <= half_h
                && t.z.atan2(t.x).abs() <= half_v;
            in_view.then_some((landmark.id, camera_to_landmark))
        })
        .collect();

    let mut detections: Vec<Detection> = visible
        .into_iter()
        .map(|(landmark_id, camera_to_landmark)| {
            let camera_to_landmark = if properties.has_calib_error() {
                noise.calib_rotation(properties).compose(camera_to_landmark)
            } else {
                camera_to_landmark
            };
            Detection {
                landmark_id,
                ambiguity: properties.ambiguity,
                camera_to_landmark,
                alt_camera_to_landmark: None,
            }
        })
        .collect();
    detections.sort_by_key(|d| d.landmark_id);

    let multi_landmark = (detections.len() > 1).then(|| {
        let field_to_camera = if properties.has_calib_error() {
            field_to_camera.compose(noise.calib_rotation(properties).inverse())
        } else {
            field_to_camera
        };
        MultiLandmarkSolve {
            field_to_camera,
            landmark_ids: detections.iter().map(|d| d.landmark_id).collect(),
        }
    });

    let latency_ms = if properties.latency_std_dev_ms > 0.0 {
        noise
            .gaussian(properties.latency_ms, properties.latency_std_dev_ms)
            .max(0.0)
    } else {
        properties.latency_ms
    };

    DetectionBatch {
        timestamp_s: now_s - latency_ms / 1000.0,
        latency_ms,
        detections,
        multi_landmark,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimDriveBase
// ────────────────────────────────────────────────────────────────────────────

/// A simulated dead-reckoning tracker.
///
/// Odometry is integrated with a configurable per-step drift; every vision
/// measurement replaces the tracked pose outright.
#[derive(Debug, Clone)]
pub struct SimDriveBase {
    pose: Pose2d,
    /// Extra heading error added on every [`drive`][Self::drive] step.
    heading_drift_rad: f64,
    measurements: Vec<VisionMeasurement>,
}

impl SimDriveBase {
    pub fn new(start: Pose2d) -> Self {
        Self {
            pose: start,
            heading_drift_rad: 0.0,
            measurements: Vec::new(),
        }
    }

    pub fn with_heading_drift(mut self, drift_rad: f64) -> Self {
        self.heading_drift_rad = drift_rad;
        self
    }

    /// Integrate a robot-relative displacement.
    pub fn drive(&mut self, forward: f64, left: f64, turn_rad: f64) {
        let (s, c) = self.pose.heading_rad.sin_cos();
        self.pose.x += forward * c - left * s;
        self.pose.y += forward * s + left * c;
        self.pose.heading_rad = fieldpose_types::geometry::wrap_angle(
            self.pose.heading_rad + turn_rad + self.heading_drift_rad,
        );
    }

    /// Every measurement received so far, oldest first.
    pub fn measurements(&self) -> &[VisionMeasurement] {
        &self.measurements
    }
}

impl ReferencePoseProvider for SimDriveBase {
    fn current_pose(&self) -> Pose2d {
        self.pose
    }
}

impl PoseCorrector for SimDriveBase {
    fn add_vision_measurement(&mut self, measurement: &VisionMeasurement) {
        self.pose = measurement.pose;
        self.measurements.push(*measurement);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fieldpose_types::geometry::{Quaternion, Vec3};
    use fieldpose_types::{Landmark, UncertaintyVector};
    use std::f64::consts::PI;

    fn wall_landmark(id: u32, x: f64, y: f64) -> Landmark {
        Landmark {
            id,
            pose: Transform3D::new(Vec3::new(x, y, 0.0), Quaternion::from_yaw(PI)),
        }
    }

    fn sim_with(landmarks: Vec<Landmark>) -> SimVisionSystem {
        SimVisionSystem::new(LandmarkMap::new(landmarks).unwrap(), SimProperties::default())
    }

    #[test]
    fn renders_visible_landmarks_only() {
        let mut sim = sim_with(vec![
            wall_landmark(1, 3.0, 0.0),
            wall_landmark(2, -3.0, 0.0), // behind the camera
            wall_landmark(3, 20.0, 0.0), // out of range
        ]);
        let mut cam = sim.add_camera(CameraConfig::new("front", Transform3D::identity()));

        sim.update(Pose2d::default(), 2.0);
        let batches = cam.poll_batches().unwrap();
        assert_eq!(batches.len(), 1);
        let ids: Vec<u32> = batches[0].detections.iter().map(|d| d.landmark_id).collect();
        assert_eq!(ids, vec![1]);
        assert!(batches[0].multi_landmark.is_none());
    }

    #[test]
    fn batches_are_stamped_with_latency() {
        let mut sim = sim_with(vec![wall_landmark(1, 3.0, 0.0)]);
        let mut cam = sim.add_camera(CameraConfig::new("front", Transform3D::identity()));
        sim.update(Pose2d::default(), 2.0);
        let batch = &cam.poll_batches().unwrap()[0];
        assert!((batch.timestamp_s - 1.965).abs() < 1e-9);
        assert!((batch.latency_ms - 35.0).abs() < 1e-9);
    }

    #[test]
    fn multiple_landmarks_include_multi_solve() {
        let mut sim = sim_with(vec![wall_landmark(1, 3.0, 0.5), wall_landmark(2, 3.0, -0.5)]);
        let mut cam = sim.add_camera(CameraConfig::new("front", Transform3D::identity()));
        let truth = Pose2d::new(0.2, 0.1, 0.05);
        sim.update(truth, 1.0);

        let batch = &cam.poll_batches().unwrap()[0];
        let multi = batch.multi_landmark.as_ref().unwrap();
        assert_eq!(multi.landmark_ids, vec![1, 2]);
        let solved = multi.field_to_camera.to_pose2d();
        assert!((solved.x - truth.x).abs() < 1e-9);
        assert!((solved.heading_rad - truth.heading_rad).abs() < 1e-9);
    }

    #[test]
    fn detection_reprojects_to_landmark() {
        let landmark = wall_landmark(5, 2.0, 1.0);
        let mut sim = sim_with(vec![landmark]);
        let mount = Transform3D::from_degrees(Vec3::new(0.3, 0.2, 0.2), 0.0, 0.0, 20.0);
        let mut cam = sim.add_camera(CameraConfig::new("left", mount));
        let truth = Pose2d::new(0.0, 0.0, 0.2);
        sim.update(truth, 1.0);

        let det = cam.poll_batches().unwrap()[0].detections[0];
        let field = Transform3D::from_pose2d(truth)
            .compose(mount)
            .compose(det.camera_to_landmark);
        assert!((field.translation.x - 2.0).abs() < 1e-9);
        assert!((field.translation.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disconnected_camera_reports_unavailable() {
        let mut sim = sim_with(vec![wall_landmark(1, 3.0, 0.0)]);
        let mut cam = sim.add_camera(CameraConfig::new("front", Transform3D::identity()));
        sim.set_connected("front", false);
        sim.update(Pose2d::default(), 1.0);
        assert!(matches!(
            cam.poll_batches(),
            Err(FieldError::SensorUnavailable { .. })
        ));

        sim.set_connected("front", true);
        assert!(cam.poll_batches().unwrap().is_empty());
    }

    fn noisy(properties: SimProperties) -> (SimVisionSystem, SimCamera) {
        let map = LandmarkMap::new([wall_landmark(1, 3.0, 0.0)]).unwrap();
        let mut sim = SimVisionSystem::new(map, properties);
        let cam = sim.add_camera(CameraConfig::new("front", Transform3D::identity()));
        (sim, cam)
    }

    #[test]
    fn calibration_error_perturbs_detections_slightly() {
        let (mut sim, mut cam) = noisy(SimProperties {
            fps: 0.0,
            ..SimProperties::competition()
        });
        let mut worst = 0.0f64;
        for step in 1..=200 {
            sim.update(Pose2d::default(), step as f64 * 0.02);
            let det = cam.poll_batches().unwrap()[0].detections[0];
            let t = det.camera_to_landmark.translation;
            worst = worst.max(((t.x - 3.0).powi(2) + t.y.powi(2) + t.z.powi(2)).sqrt());
        }
        // A fraction of a pixel at 3 m is a few millimetres.
        assert!(worst > 1e-6, "no noise applied");
        assert!(worst < 0.01, "noise too large: {worst}");
    }

    #[test]
    fn latency_jitter_spreads_timestamps() {
        let (mut sim, mut cam) = noisy(SimProperties {
            latency_std_dev_ms: 5.0,
            ..SimProperties::default()
        });
        let mut latencies = Vec::new();
        for step in 1..=200 {
            let now = step as f64 * 0.02;
            sim.update(Pose2d::default(), now);
            let batch = &cam.poll_batches().unwrap()[0];
            assert!((batch.timestamp_s - (now - batch.latency_ms / 1000.0)).abs() < 1e-12);
            latencies.push(batch.latency_ms);
        }
        assert!(latencies.iter().all(|l| *l >= 0.0 && (l - 35.0).abs() < 40.0));
        assert!(latencies.iter().any(|l| (l - 35.0).abs() > 1e-6));
        let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
        assert!((mean - 35.0).abs() < 2.0, "mean latency {mean}");
    }

    #[test]
    fn same_seed_reproduces_the_run() {
        let run = |seed| {
            let (mut sim, mut cam) = noisy(SimProperties {
                seed,
                ..SimProperties::competition()
            });
            let mut out = Vec::new();
            for step in 1..=20 {
                sim.update(Pose2d::new(0.1, 0.0, 0.05), step as f64 * 0.02);
                out.extend(cam.poll_batches().unwrap());
            }
            out
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn frame_rate_caps_rendered_batches() {
        let count = |fps| {
            let (mut sim, mut cam) = noisy(SimProperties {
                fps,
                ..SimProperties::default()
            });
            (1..=50)
                .map(|step| {
                    sim.update(Pose2d::default(), step as f64 * 0.02);
                    cam.poll_batches().unwrap().len()
                })
                .sum::<usize>()
        };
        assert_eq!(count(0.0), 50);
        // One second of 50 Hz updates at 30 FPS.
        let capped = count(30.0);
        assert!((29..=31).contains(&capped), "{capped} frames");
    }

    #[test]
    fn drive_base_integrates_and_accepts_corrections() {
        let mut base = SimDriveBase::new(Pose2d::new(0.0, 0.0, PI / 2.0));
        base.drive(1.0, 0.0, 0.0);
        let pose = base.current_pose();
        assert!(pose.x.abs() < 1e-9);
        assert!((pose.y - 1.0).abs() < 1e-9);

        let m = VisionMeasurement {
            pose: Pose2d::new(5.0, 5.0, 0.0),
            timestamp_s: 1.0,
            std_devs: UncertaintyVector::new(0.5, 0.5, 1.0),
        };
        base.add_vision_measurement(&m);
        assert_eq!(base.current_pose(), Pose2d::new(5.0, 5.0, 0.0));
        assert_eq!(base.measurements().len(), 1);
    }

    #[test]
    fn heading_drift_accumulates() {
        let mut base = SimDriveBase::new(Pose2d::default()).with_heading_drift(0.01);
        for _ in 0..10 {
            base.drive(0.0, 0.0, 0.0);
        }
        assert!((base.current_pose().heading_rad - 0.1).abs() < 1e-9);
    }
}
