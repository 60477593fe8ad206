//! `fieldpose-perception` – turns per-camera pose candidates into one
//! confidence-weighted field pose.
//!
//! # Modules
//!
//! - [`filter`] – [`ObservationFilter`][filter::ObservationFilter]: drops
//!   ambiguous single-landmark solves before they carry any weight.
//! - [`uncertainty`] – [`UncertaintyModel`][uncertainty::UncertaintyModel]:
//!   adaptive per-axis noise that grows with landmark range.
//! - [`fusion`] – [`FusionEngine`][fusion::FusionEngine]: inverse-variance
//!   weighted combination of every accepted camera.

pub mod filter;
pub mod fusion;
pub mod uncertainty;

pub use filter::ObservationFilter;
pub use fusion::{FusionEngine, FusionInput, HeadingFusion};
pub use uncertainty::UncertaintyModel;
