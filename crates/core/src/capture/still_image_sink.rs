use crate::shared::error::BoxError;
use crate::shared::frame::Frame;

/// Reference to an encoded still written by a [`StillImageSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageHandle {
    /// Sink-specific location, e.g. a file path.
    pub location: String,
    pub width: u32,
    pub height: u32,
}

/// Domain interface for persisting a captured (already masked) frame.
pub trait StillImageSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<ImageHandle, BoxError>;
}
