//! [`ChannelCamera`] – buffered feed from an asynchronous camera driver.
//!
//! The driver side (a network client, a coprocessor reader thread, a Tokio
//! task) pushes every pipeline result into an unbounded channel as it
//! arrives.  The localization tick drains whatever is already buffered with
//! `try_recv` and never waits for new arrivals.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_hal::camera::CameraDriver;
//! use fieldpose_hal::channel::ChannelCamera;
//! use fieldpose_types::DetectionBatch;
//!
//! let (mut camera, feed) = ChannelCamera::new("OV9281_01");
//! feed.send(DetectionBatch {
//!     timestamp_s: 0.5,
//!     latency_ms: 30.0,
//!     detections: Vec::new(),
//!     multi_landmark: None,
//! })
//! .unwrap();
//!
//! assert_eq!(camera.poll_batches().unwrap().len(), 1);
//! assert!(camera.poll_batches().unwrap().is_empty());
//! ```

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::trace;

use fieldpose_types::{DetectionBatch, FieldError};

use crate::camera::CameraDriver;

/// A [`CameraDriver`] backed by the receiving half of a Tokio channel.
pub struct ChannelCamera {
    id: String,
    rx: UnboundedReceiver<DetectionBatch>,
}

impl ChannelCamera {
    /// Create the camera and the sender the driver side writes to.
    pub fn new(id: impl Into<String>) -> (Self, UnboundedSender<DetectionBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: id.into(), rx }, tx)
    }
}

impl CameraDriver for ChannelCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll_batches(&mut self) -> Result<Vec<DetectionBatch>, FieldError> {
        let mut batches = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(batch) => batches.push(batch),
                Err(TryRecvError::Empty) => break,
                // Results buffered before the driver went away are still valid.
                Err(TryRecvError::Disconnected) if !batches.is_empty() => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(FieldError::SensorUnavailable {
                        camera: self.id.clone(),
                        details: "driver channel closed".to_string(),
                    });
                }
            }
        }
        trace!(camera = %self.id, drained = batches.len(), "drained camera channel");
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(t: f64) -> DetectionBatch {
        DetectionBatch {
            timestamp_s: t,
            latency_ms: 0.0,
            detections: Vec::new(),
            multi_landmark: None,
        }
    }

    #[test]
    fn drains_in_arrival_order() {
        let (mut cam, tx) = ChannelCamera::new("left");
        tx.send(batch(1.0)).unwrap();
        tx.send(batch(2.0)).unwrap();
        tx.send(batch(3.0)).unwrap();

        let drained = cam.poll_batches().unwrap();
        let times: Vec<f64> = drained.iter().map(|b| b.timestamp_s).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_channel_returns_no_batches() {
        let (mut cam, _tx) = ChannelCamera::new("left");
        assert!(cam.poll_batches().unwrap().is_empty());
    }

    #[test]
    fn closed_channel_is_sensor_unavailable() {
        let (mut cam, tx) = ChannelCamera::new("left");
        drop(tx);
        let err = cam.poll_batches().unwrap_err();
        assert!(matches!(err, FieldError::SensorUnavailable { ref camera, .. } if camera == "left"));
    }

    #[test]
    fn buffered_batches_survive_driver_shutdown() {
        let (mut cam, tx) = ChannelCamera::new("left");
        tx.send(batch(4.0)).unwrap();
        drop(tx);
        assert_eq!(cam.poll_batches().unwrap().len(), 1);
        assert!(cam.poll_batches().is_err());
    }

    #[test]
    fn driver_thread_feeds_camera() {
        let (mut cam, tx) = ChannelCamera::new("rear");
        let handle = std::thread::spawn(move || {
            for i in 0..5 {
                tx.send(batch(i as f64)).unwrap();
            }
        });
        handle.join().unwrap();
        assert_eq!(cam.poll_batches().unwrap().len(), 5);
    }
}
