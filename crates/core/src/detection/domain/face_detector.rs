use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

/// Domain interface for face detection.
///
/// Returns zero or more detector-space regions for one frame. Implementations
/// may be stateful, hence `&mut self`. Errors are treated as a miss by the
/// cascade and never reach the caller of the pipeline.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, BoxError>;
}

/// Which detector configuration the cascade should call this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectorMode {
    #[default]
    Fast,
    Accurate,
}

/// The fast and (optional) accurate detector configurations.
///
/// Without an accurate detector, accurate mode falls back to the fast one.
pub struct DetectorSet {
    fast: Box<dyn FaceDetector>,
    accurate: Option<Box<dyn FaceDetector>>,
}

impl DetectorSet {
    pub fn new(fast: Box<dyn FaceDetector>) -> Self {
        Self {
            fast,
            accurate: None,
        }
    }

    pub fn with_accurate(mut self, accurate: Box<dyn FaceDetector>) -> Self {
        self.accurate = Some(accurate);
        self
    }

    pub fn has_accurate(&self) -> bool {
        self.accurate.is_some()
    }

    pub fn get(&mut self, mode: DetectorMode) -> &mut dyn FaceDetector {
        match (mode, self.accurate.as_mut()) {
            (DetectorMode::Accurate, Some(accurate)) => accurate.as_mut(),
            _ => self.fast.as_mut(),
        }
    }
}
