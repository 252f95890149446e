use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

/// Stand-in when no detection model is available. Every call fails, so the
/// cascade walks straight down to its conservative tiers.
#[derive(Debug, Default)]
pub struct UnavailableDetector;

impl FaceDetector for UnavailableDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, BoxError> {
        Err("no face detector available".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_errors() {
        let mut d = UnavailableDetector;
        assert!(d.detect(&Frame::filled(2, 2, 0, 0)).is_err());
    }
}
