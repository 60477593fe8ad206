//! `fieldpose` – headless localization demo.
//!
//! This binary wires the whole FieldPose stack together against the
//! simulated vision system:
//!
//! 1. Loads `fieldpose.toml` (or `$FIELDPOSE_CONFIG`); falls back to the
//!    built-in robot and field layout when the file is absent or invalid.
//!    `fieldpose --init` writes the effective configuration and exits.
//! 2. Registers one simulated camera per configured mount and builds the
//!    [`LocalizationService`].
//! 3. Strafes the robot around the field hub at a fixed tick rate.  Odometry drifts;
//!    every fused vision measurement corrects it.
//! 4. Intercepts **Ctrl-C** to stop the loop and print a JSON summary.

mod config;

use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use colored::Colorize;
use tracing::{info, warn};

use fieldpose_hal::{CameraAdapter, PoseCorrector, ReferencePoseProvider, SimDriveBase, SimVisionSystem};
use fieldpose_runtime::{LocalizationService, init_tracing};
use fieldpose_types::Pose2d;
use fieldpose_types::geometry::wrap_angle;

use crate::config::{Config, SimConfig};

/// Log the tracking error once per this many ticks.
const REPORT_EVERY: u64 = 50;

fn main() {
    let _tracing = init_tracing("fieldpose");

    print_banner();

    let init = std::env::args().skip(1).any(|a| a == "--init");
    let cfg = load_config();

    if init {
        match config::save(&cfg) {
            Ok(()) => println!(
                "  {} Config written to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
        return;
    }

    let landmarks = match cfg.landmark_map() {
        Ok(map) => map,
        Err(e) => {
            println!("{}: {}", "Invalid landmark layout".red(), e);
            std::process::exit(1);
        }
    };

    // ── Composition ───────────────────────────────────────────────────────
    let mut sim = SimVisionSystem::new(landmarks.clone(), cfg.sim.vision);
    let cameras: Vec<CameraAdapter> = cfg
        .camera_configs()
        .into_iter()
        .map(|camera| {
            let driver = sim.add_camera(camera.clone());
            CameraAdapter::new(camera, Box::new(driver))
        })
        .collect();
    let mut service = LocalizationService::new(&cfg.localization, landmarks, cameras);

    let path = CirclePath::from(&cfg.sim);
    let mut base = SimDriveBase::new(path.pose_at(0.0))
        .with_heading_drift(cfg.sim.heading_drift_deg.to_radians());

    info!(
        cameras = service.camera_ids().count(),
        landmarks = service.landmarks().len(),
        tick_period_ms = cfg.tick_period_ms,
        "localization loop starting"
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping localization loop …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop can only stop after the configured tick count");
    }

    // ── Tick loop ─────────────────────────────────────────────────────────
    let period = Duration::from_millis(cfg.tick_period_ms);
    let dt = period.as_secs_f64();
    let mut truth = path.pose_at(0.0);
    let mut corrections = 0u64;
    let mut worst_error = 0.0f64;

    while !shutdown.load(Ordering::SeqCst) && (cfg.ticks == 0 || service.ticks() < cfg.ticks) {
        let frame_start = Instant::now();
        let now_s = (service.ticks() + 1) as f64 * dt;

        truth = path.pose_at(now_s);
        let (left, turn) = path.step(dt);
        base.drive(0.0, left, turn);

        sim.update(truth, now_s);
        if let Some(measurement) = service.tick(&base) {
            base.add_vision_measurement(&measurement);
            corrections += 1;
        }

        let error = base.current_pose().distance_to(&truth);
        worst_error = worst_error.max(error);
        if service.ticks() % REPORT_EVERY == 0 {
            info!(
                tick = service.ticks(),
                error_m = error,
                corrections,
                "tracking"
            );
        }

        if let Some(rest) = period.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    // ── Summary ───────────────────────────────────────────────────────────
    let telemetry: serde_json::Map<String, serde_json::Value> = service
        .camera_ids()
        .filter_map(|id| {
            let t = service.telemetry(id)?;
            Some((id.to_string(), serde_json::to_value(t).ok()?))
        })
        .collect();
    let summary = serde_json::json!({
        "ticks": service.ticks(),
        "corrections": corrections,
        "final_error_m": base.current_pose().distance_to(&truth),
        "worst_error_m": worst_error,
        "latest_estimate": service.latest_estimate(),
        "cameras": telemetry,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(s) => println!("{s}"),
        Err(e) => warn!(error = %e, "failed to render summary"),
    }
    println!("{}", "  ✓ Exiting FieldPose.".green());
}

/// Load, override and validate the configuration, falling back to defaults.
fn load_config() -> Config {
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!("  No config file found; using the built-in robot and field layout.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            warn!(error = %e, "config unreadable");
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    if let Err(e) = cfg.validate() {
        warn!(error = %e, "config rejected");
        println!("{}: {}", "Config error".red(), e);
        println!("  Using default configuration.");
        return Config::default();
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted drive
// ─────────────────────────────────────────────────────────────────────────────

/// Counter-clockwise circle at constant speed, strafing sideways while the
/// robot keeps facing the centre.
#[derive(Debug, Clone, Copy)]
struct CirclePath {
    center: (f64, f64),
    radius: f64,
    speed: f64,
}

impl From<&SimConfig> for CirclePath {
    fn from(sim: &SimConfig) -> Self {
        Self {
            center: (sim.path_center_x, sim.path_center_y),
            radius: sim.path_radius_m.max(f64::EPSILON),
            speed: sim.speed_mps,
        }
    }
}

impl CirclePath {
    fn pose_at(&self, t: f64) -> Pose2d {
        let angle = self.speed * t / self.radius;
        let (s, c) = angle.sin_cos();
        Pose2d::new(
            self.center.0 + self.radius * c,
            self.center.1 + self.radius * s,
            wrap_angle(angle + PI),
        )
    }

    /// Odometry command for one tick: leftward distance and heading change.
    fn step(&self, dt: f64) -> (f64, f64) {
        let distance = self.speed * dt;
        (-distance, distance / self.radius)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _______      __    ______                "#.bold().cyan());
    println!("{}", r#"  / ____(_)__  / /___/ / __ \____  ________ "#.bold().cyan());
    println!("{}", r#" / /_  / / _ \/ / __  / /_/ / __ \/ ___/ _ \"#.bold().cyan());
    println!("{}", r#"/ __/ / /  __/ / /_/ / ____/ /_/ (__  )  __/"#.bold().cyan());
    println!("{}", r#"/_/   /_/\___/_/\__,_/_/    \____/____/\___/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "FieldPose".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Multi-camera landmark localization");
    println!();
}
