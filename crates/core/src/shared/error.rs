use thiserror::Error;

/// Boxed error used at capability boundaries (detectors, compositors, sinks).
///
/// `Send + Sync` so failures can cross from worker threads back to the
/// rendering and control contexts.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced to the control context by a capture request.
///
/// Masking problems never appear here: the fallback tiers absorb them.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no masked frame has been rendered yet")]
    NotReady,
    #[error("still-image sink failed: {0}")]
    Sink(#[source] BoxError),
    #[error("capture cancelled before completion")]
    Cancelled,
    #[error("masking session has ended")]
    SessionEnded,
}

impl CaptureError {
    /// Whether the caller may simply call `capture()` again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::NotReady | CaptureError::Sink(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
