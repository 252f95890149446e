use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

use super::detection_result::{DetectionMethod, DetectionResult};
use super::face_detector::{DetectorMode, DetectorSet};
use super::face_prior::{self, AGGRESSIVE_CONFIDENCE, HEURISTIC_CONFIDENCE};
use super::face_tracker::{FaceTracker, TrackerSettings};

/// Miss thresholds and tracker parameters for the cascade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeSettings {
    /// Consecutive misses at which the heuristic prior takes over.
    pub heuristic_threshold: u32,
    /// Consecutive misses at which the full-frame band takes over.
    pub aggressive_threshold: u32,
    /// Primary regions beyond this count are collapsed into one overflow box.
    pub max_faces: usize,
    pub tracker: TrackerSettings,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            heuristic_threshold: 5,
            aggressive_threshold: 15,
            max_faces: 10,
            tracker: TrackerSettings::default(),
        }
    }
}

/// Mutable cascade state scoped to one masking session.
#[derive(Debug)]
pub struct CascadeState {
    frames: u64,
    consecutive_misses: u32,
    tracker: FaceTracker,
    tier: DetectionMethod,
}

impl CascadeState {
    pub fn new(settings: &CascadeSettings) -> Self {
        Self {
            frames: 0,
            consecutive_misses: 0,
            tracker: FaceTracker::new(settings.tracker),
            tier: DetectionMethod::Primary,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    /// Tier of the most recent non-empty result.
    pub fn tier(&self) -> DetectionMethod {
        self.tier
    }

    pub fn reset(&mut self) {
        self.frames = 0;
        self.consecutive_misses = 0;
        self.tracker.reset();
        self.tier = DetectionMethod::Primary;
    }
}

/// Runs the detector and falls back through tracked, heuristic and
/// aggressive tiers as consecutive misses accumulate.
///
/// Detector errors count as misses and never propagate.
pub struct DetectionCascade {
    detectors: DetectorSet,
    settings: CascadeSettings,
}

impl DetectionCascade {
    pub fn new(detectors: DetectorSet, settings: CascadeSettings) -> Self {
        Self {
            detectors,
            settings,
        }
    }

    pub fn settings(&self) -> &CascadeSettings {
        &self.settings
    }

    pub fn run(
        &mut self,
        state: &mut CascadeState,
        frame: &Frame,
        mode: DetectorMode,
    ) -> DetectionResult {
        state.frames += 1;

        let detected = match self.detectors.get(mode).detect(frame) {
            Ok(regions) => regions,
            Err(e) => {
                log::debug!("Face detector failed on frame {}: {e}", frame.index());
                Vec::new()
            }
        };

        let result = if detected.is_empty() {
            self.on_miss(state, frame)
        } else {
            self.on_hit(state, frame, detected)
        };

        if !result.is_empty() {
            self.note_tier(state, result.method());
        }
        result
    }

    fn on_hit(
        &self,
        state: &mut CascadeState,
        frame: &Frame,
        mut regions: Vec<FaceRegion>,
    ) -> DetectionResult {
        state.consecutive_misses = 0;

        let max_faces = self.settings.max_faces.max(1);
        let overflow = if regions.len() > max_faces {
            let extra = regions.split_off(max_faces);
            log::debug!(
                "{} faces over the per-frame cap, masking them as one block",
                extra.len()
            );
            FaceRegion::enclosing(&extra).map(|r| r.with_confidence(1.0))
        } else {
            None
        };

        let regions = state.tracker.observe(regions);
        DetectionResult::new(
            regions,
            DetectionMethod::Primary,
            1.0,
            frame.timestamp_ms(),
        )
        .with_overflow(overflow)
    }

    fn on_miss(&self, state: &mut CascadeState, frame: &Frame) -> DetectionResult {
        state.consecutive_misses = state.consecutive_misses.saturating_add(1);
        let misses = state.consecutive_misses;
        let carried = state.tracker.miss();
        let fw = frame.width() as f64;
        let fh = frame.height() as f64;
        let ts = frame.timestamp_ms();

        if misses >= self.settings.aggressive_threshold {
            let mut regions = face_prior::aggressive_regions(frame.facing(), fw, fh);
            regions.extend(carried);
            DetectionResult::new(regions, DetectionMethod::Aggressive, AGGRESSIVE_CONFIDENCE, ts)
        } else if misses >= self.settings.heuristic_threshold {
            let mut regions = face_prior::heuristic_regions(frame.facing(), fw, fh);
            regions.extend(carried);
            DetectionResult::new(regions, DetectionMethod::Heuristic, HEURISTIC_CONFIDENCE, ts)
        } else if !carried.is_empty() {
            let confidence = state.tracker.decayed_confidence();
            DetectionResult::new(carried, DetectionMethod::Tracked, confidence, ts)
        } else {
            DetectionResult::empty(ts)
        }
    }

    fn note_tier(&self, state: &mut CascadeState, method: DetectionMethod) {
        if method == state.tier {
            return;
        }
        match method {
            DetectionMethod::Heuristic | DetectionMethod::Aggressive => log::info!(
                "Face detection degraded to {method} mode after {} consecutive misses",
                state.consecutive_misses
            ),
            DetectionMethod::Primary if state.tier.is_synthesized() => {
                log::info!("Face detection recovered from {} mode", state.tier)
            }
            _ => {}
        }
        state.tier = method;
    }
}
