//! Configuration file – reads/writes `fieldpose.toml`.
//!
//! Every section is optional; a missing file or a missing key falls back to
//! the competition robot's camera mounts and the demo landmark layout.
//!
//! ```toml
//! tick_period_ms = 20
//! ticks = 500
//!
//! [localization]
//! max_ambiguity = 0.25
//! heading_fusion = "circular"
//! fallback_strategy = "lowest_ambiguity"
//!
//! [[cameras]]
//! id = "OV9281_01"
//! mount = { x = 0.306, y = 0.279, z = 0.214, pitch_deg = -24.1, yaw_deg = 30.0 }
//!
//! [[landmarks]]
//! id = 1
//! x = 16.5
//! y = 2.0
//! z = 1.3
//! yaw_deg = 180.0
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fieldpose_hal::SimProperties;
use fieldpose_runtime::LocalizationConfig;
use fieldpose_types::geometry::{Transform3D, Vec3};
use fieldpose_types::{CameraConfig, FieldError, Landmark, LandmarkMap, UncertaintyVector};

const INCH: f64 = 0.0254;

// ────────────────────────────────────────────────────────────────────────────
// Sections
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D pose in configuration units: metres and degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSection {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
}

impl PoseSection {
    pub fn to_transform(self) -> Transform3D {
        Transform3D::from_degrees(
            Vec3::new(self.x, self.y, self.z),
            self.roll_deg,
            self.pitch_deg,
            self.yaw_deg,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSection {
    pub id: String,
    /// Camera pose in the robot frame.
    #[serde(default)]
    pub mount: PoseSection,
    #[serde(default = "default_single_std_devs")]
    pub single_std_devs: UncertaintyVector,
    #[serde(default = "default_multi_std_devs")]
    pub multi_std_devs: UncertaintyVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSection {
    pub id: u32,
    /// Landmark pose in the field frame.
    #[serde(flatten)]
    pub pose: PoseSection,
}

/// Simulated vision plus the scripted drive the demo loop follows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    #[serde(flatten)]
    pub vision: SimProperties,
    /// The robot circles this point of the field while facing it.
    pub path_center_x: f64,
    pub path_center_y: f64,
    pub path_radius_m: f64,
    pub speed_mps: f64,
    /// Heading error the simulated odometry accumulates per tick.
    pub heading_drift_deg: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            vision: SimProperties::default(),
            path_center_x: 8.25,
            path_center_y: 4.0,
            path_radius_m: 2.5,
            speed_mps: 1.0,
            heading_drift_deg: 0.05,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Config
// ────────────────────────────────────────────────────────────────────────────

/// Persisted configuration stored in `fieldpose.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control loop period.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Number of ticks to run; `0` runs until Ctrl-C.
    #[serde(default)]
    pub ticks: u64,

    #[serde(default)]
    pub localization: LocalizationConfig,

    #[serde(default)]
    pub sim: SimConfig,

    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraSection>,

    #[serde(default = "default_landmarks")]
    pub landmarks: Vec<LandmarkSection>,
}

fn default_tick_period_ms() -> u64 {
    20
}
fn default_single_std_devs() -> UncertaintyVector {
    CameraConfig::DEFAULT_SINGLE_STD_DEVS
}
fn default_multi_std_devs() -> UncertaintyVector {
    CameraConfig::DEFAULT_MULTI_STD_DEVS
}

/// Two forward cameras toed out by 30° and one rear camera looking back and
/// up, as mounted on the competition robot (measured in inches).
fn default_cameras() -> Vec<CameraSection> {
    let camera = |id: &str, x: f64, y: f64, z: f64, pitch_deg: f64, yaw_deg: f64| CameraSection {
        id: id.to_string(),
        mount: PoseSection {
            x: x * INCH,
            y: y * INCH,
            z: z * INCH,
            roll_deg: 0.0,
            pitch_deg,
            yaw_deg,
        },
        single_std_devs: default_single_std_devs(),
        multi_std_devs: default_multi_std_devs(),
    };
    vec![
        camera("OV9281_01", 12.056, 10.981, 8.44, -24.094, 30.0),
        camera("OV9281_02", 12.056, -10.981, 8.44, -24.094, -30.0),
        camera("OV9281_03", -11.25, 9.0, 20.5, -155.0, 0.0),
    ]
}

/// Eight wall and structure landmarks on a 16.5 m × 8 m field facing the
/// field centre, plus a four-sided hub in the middle facing outwards.
fn default_landmarks() -> Vec<LandmarkSection> {
    let landmark = |id, x, y, z, yaw_deg| LandmarkSection {
        id,
        pose: PoseSection {
            x,
            y,
            z,
            yaw_deg,
            ..PoseSection::default()
        },
    };
    vec![
        landmark(1, 16.5, 2.0, 1.3, 180.0),
        landmark(2, 16.5, 6.0, 1.3, 180.0),
        landmark(3, 0.0, 2.0, 1.3, 0.0),
        landmark(4, 0.0, 6.0, 1.3, 0.0),
        landmark(5, 8.25, 0.0, 1.3, 90.0),
        landmark(6, 8.25, 8.0, 1.3, -90.0),
        landmark(7, 12.0, 4.0, 0.5, 180.0),
        landmark(8, 4.5, 4.0, 0.5, 0.0),
        landmark(9, 8.85, 4.0, 0.5, 0.0),
        landmark(10, 8.25, 4.6, 0.5, 90.0),
        landmark(11, 7.65, 4.0, 0.5, 180.0),
        landmark(12, 8.25, 3.4, 0.5, -90.0),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            ticks: 0,
            localization: LocalizationConfig::default(),
            sim: SimConfig::default(),
            cameras: default_cameras(),
            landmarks: default_landmarks(),
        }
    }
}

impl Config {
    /// Reject values the localization loop cannot run with.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.tick_period_ms == 0 {
            return Err(FieldError::Config("tick_period_ms must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.localization.max_ambiguity) {
            return Err(FieldError::Config(format!(
                "max_ambiguity {} is outside [0, 1]",
                self.localization.max_ambiguity
            )));
        }
        let model = self.localization.uncertainty;
        if !(model.range_noise_divisor.is_finite() && model.range_noise_divisor > 0.0) {
            return Err(FieldError::Config("range_noise_divisor must be positive".into()));
        }
        if !(model.range_trust_threshold.is_finite() && model.range_trust_threshold >= 0.0) {
            return Err(FieldError::Config(format!(
                "range_trust_threshold {} must be finite and non-negative",
                model.range_trust_threshold
            )));
        }
        let vision = self.sim.vision;
        for (name, value) in [
            ("calib_error_px", vision.calib_error_px),
            ("calib_error_std_dev_px", vision.calib_error_std_dev_px),
            ("latency_std_dev_ms", vision.latency_std_dev_ms),
            ("fps", vision.fps),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(FieldError::Config(format!(
                    "sim {name} {value} must be finite and non-negative"
                )));
            }
        }
        if self.cameras.is_empty() {
            return Err(FieldError::Config("at least one camera is required".into()));
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id.as_str()) {
                return Err(FieldError::Config(format!(
                    "camera {} is defined more than once",
                    camera.id
                )));
            }
            for (name, sigma) in [
                ("single_std_devs", camera.single_std_devs),
                ("multi_std_devs", camera.multi_std_devs),
            ] {
                if !sigma.is_valid() {
                    return Err(FieldError::Config(format!(
                        "camera {}: {name} must be positive and finite, got {:?}",
                        camera.id,
                        sigma.as_array()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn landmark_map(&self) -> Result<LandmarkMap, FieldError> {
        LandmarkMap::new(self.landmarks.iter().map(|l| Landmark {
            id: l.id,
            pose: l.pose.to_transform(),
        }))
    }

    pub fn camera_configs(&self) -> Vec<CameraConfig> {
        self.cameras
            .iter()
            .map(|c| {
                CameraConfig::new(c.id.clone(), c.mount.to_transform())
                    .with_std_devs(c.single_std_devs, c.multi_std_devs)
            })
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Load / save
// ────────────────────────────────────────────────────────────────────────────

/// `$FIELDPOSE_CONFIG`, or `fieldpose.toml` in the working directory.
pub fn config_path() -> PathBuf {
    config_path_from(std::env::var("FIELDPOSE_CONFIG").ok())
}

pub(crate) fn config_path_from(explicit: Option<String>) -> PathBuf {
    explicit
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fieldpose.toml"))
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, FieldError> {
    load_from(&config_path())
}

/// Load the config from `path` and apply environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, FieldError> {
    let Some(mut cfg) = read_from(path)? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

fn read_from(path: &Path) -> Result<Option<Config>, FieldError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        FieldError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| FieldError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `FIELDPOSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `FIELDPOSE_TICK_PERIOD_MS` | `tick_period_ms` |
/// | `FIELDPOSE_TICKS` | `ticks` |
/// | `FIELDPOSE_MAX_AMBIGUITY` | `localization.max_ambiguity` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("FIELDPOSE_TICK_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.tick_period_ms = ms;
    }
    if let Ok(v) = std::env::var("FIELDPOSE_TICKS")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.ticks = n;
    }
    if let Ok(v) = std::env::var("FIELDPOSE_MAX_AMBIGUITY")
        && let Ok(a) = v.parse::<f64>()
    {
        cfg.localization.max_ambiguity = a;
    }
}

/// Save the config to [`config_path`].
pub fn save(cfg: &Config) -> Result<(), FieldError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), FieldError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            FieldError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| FieldError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        FieldError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}
