//! `fieldpose-hal` – sensor abstraction layer.
//!
//! # Modules
//!
//! - [`camera`] – the [`CameraDriver`][camera::CameraDriver] trait and the
//!   dead-reckoning seams [`ReferencePoseProvider`][camera::ReferencePoseProvider]
//!   and [`PoseCorrector`][camera::PoseCorrector].
//! - [`channel`] – [`ChannelCamera`][channel::ChannelCamera]: buffered feed
//!   from an asynchronous driver over a Tokio channel.
//! - [`sim`] – [`SimVisionSystem`][sim::SimVisionSystem] and
//!   [`SimDriveBase`][sim::SimDriveBase] for headless runs.
//! - [`adapter`] – [`CameraAdapter`][adapter::CameraAdapter]: per-camera
//!   newest-batch selection, landmark resolution and mounting-offset removal.

pub mod adapter;
pub mod camera;
pub mod channel;
pub mod sim;

pub use adapter::{CameraAdapter, FallbackStrategy};
pub use camera::{CameraDriver, PoseCorrector, ReferencePoseProvider};
pub use channel::ChannelCamera;
pub use sim::{SimCamera, SimDriveBase, SimProperties, SimVisionSystem};
