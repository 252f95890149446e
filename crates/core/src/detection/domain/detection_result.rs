use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::region::FaceRegion;

/// Cascade tier that produced a result, in order of preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Primary,
    Tracked,
    Heuristic,
    Aggressive,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 4] = [
        DetectionMethod::Primary,
        DetectionMethod::Tracked,
        DetectionMethod::Heuristic,
        DetectionMethod::Aggressive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::Primary => "primary",
            DetectionMethod::Tracked => "tracked",
            DetectionMethod::Heuristic => "heuristic",
            DetectionMethod::Aggressive => "aggressive",
        }
    }

    /// Heuristic and aggressive regions come from a prior, not a detector.
    pub fn is_synthesized(self) -> bool {
        matches!(self, DetectionMethod::Heuristic | DetectionMethod::Aggressive)
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame's cascade output, in detector-space. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    regions: Vec<FaceRegion>,
    overflow: Option<FaceRegion>,
    method: DetectionMethod,
    confidence: f64,
    timestamp_ms: u64,
}

impl DetectionResult {
    pub fn new(
        regions: Vec<FaceRegion>,
        method: DetectionMethod,
        confidence: f64,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            regions,
            overflow: None,
            method,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp_ms,
        }
    }

    /// Nothing detected and no fallback applies yet.
    pub fn empty(timestamp_ms: u64) -> Self {
        Self::new(Vec::new(), DetectionMethod::Primary, 0.0, timestamp_ms)
    }

    /// Attaches the bounding box of faces beyond the per-frame processing cap.
    pub fn with_overflow(mut self, overflow: Option<FaceRegion>) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn regions(&self) -> &[FaceRegion] {
        &self.regions
    }

    pub fn overflow(&self) -> Option<&FaceRegion> {
        self.overflow.as_ref()
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty() && self.overflow.is_none()
    }
}
