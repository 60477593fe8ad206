//! [`ObservationFilter`] – single-landmark ambiguity gate.
//!
//! A solve from one planar landmark can flip to its mirror image; the
//! ambiguity score measures how close that alternate is.  Observations built
//! from several landmarks are geometrically constrained and always pass.

use fieldpose_types::{CameraObservation, FieldError};

/// Default maximum ambiguity accepted for a single-landmark observation.
pub const DEFAULT_MAX_AMBIGUITY: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationFilter {
    max_ambiguity: f64,
}

impl Default for ObservationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AMBIGUITY)
    }
}

impl ObservationFilter {
    pub fn new(max_ambiguity: f64) -> Self {
        Self { max_ambiguity }
    }

    /// Accept or reject `obs`.
    ///
    /// # Errors
    ///
    /// [`FieldError::AmbiguousSingleLandmark`] when exactly one landmark was
    /// used and its ambiguity is strictly above the threshold.
    pub fn check(&self, obs: &CameraObservation) -> Result<(), FieldError> {
        if obs.landmark_count() == 1 && obs.best_ambiguity > self.max_ambiguity {
            return Err(FieldError::AmbiguousSingleLandmark {
                camera: obs.camera.clone(),
                ambiguity: obs.best_ambiguity,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldpose_types::Pose2d;

    fn obs(ids: Vec<u32>, ambiguity: f64) -> CameraObservation {
        CameraObservation {
            camera: "left".to_string(),
            pose: Pose2d::default(),
            timestamp_s: 0.0,
            landmark_ids: ids,
            best_ambiguity: ambiguity,
        }
    }

    #[test]
    fn ambiguous_single_landmark_is_rejected() {
        let filter = ObservationFilter::default();
        let err = filter.check(&obs(vec![3], 0.3)).unwrap_err();
        assert!(matches!(err, FieldError::AmbiguousSingleLandmark { .. }));
    }

    #[test]
    fn clear_single_landmark_passes() {
        assert!(ObservationFilter::default().check(&obs(vec![3], 0.1)).is_ok());
    }

    #[test]
    fn threshold_is_exclusive() {
        assert!(ObservationFilter::default().check(&obs(vec![3], 0.25)).is_ok());
    }

    #[test]
    fn multi_landmark_ignores_ambiguity() {
        assert!(ObservationFilter::default().check(&obs(vec![1, 2], 0.9)).is_ok());
    }

    #[test]
    fn custom_threshold() {
        let filter = ObservationFilter::new(0.1);
        assert!(filter.check(&obs(vec![7], 0.1)).is_ok());
        assert!(filter.check(&obs(vec![7], 0.15)).is_err());
    }
}
