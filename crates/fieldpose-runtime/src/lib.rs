//! `fieldpose-runtime` – the per-tick localization loop.
//!
//! # Modules
//!
//! - [`localization`] – [`LocalizationService`][localization::LocalizationService]:
//!   polls every camera adapter, filters and weights their observations,
//!   fuses them, and holds the latest global estimate across ticks that
//!   produce nothing new.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   `tracing` subscriber with optional OTLP span export.

pub mod localization;
pub mod telemetry;

pub use localization::{LocalizationConfig, LocalizationService};
pub use telemetry::{init_tracing, LogFormat, TracerProviderGuard};
