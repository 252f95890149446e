use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::aggregation::detection_history::SharedHistory;
use crate::capture::detector_mode_flag::DetectorModeReader;
use crate::capture::override_slot::OverrideReader;
use crate::capture::rendered_frame_slot::{RenderedSnapshot, SnapshotPublisher};
use crate::detection::domain::detection_cascade::{CascadeState, DetectionCascade};
use crate::detection::domain::detection_result::DetectionResult;
use crate::profile::capability_profile::CapabilityProfile;
use crate::rendering::mask_renderer::{MaskRenderer, RenderedFrame};
use crate::shared::frame::Frame;

use super::session_logger::{LogSessionLogger, SessionLogger};

/// Rendering-side ends of the channels shared with the capture controller.
pub struct RenderLinks {
    pub overrides: OverrideReader,
    pub mode: DetectorModeReader,
    pub history: SharedHistory,
    pub snapshots: SnapshotPublisher,
    pub ended: Arc<AtomicBool>,
}

/// The real-time half of a masking session: detect, render, record.
///
/// Never blocks on the control context. Reads the override and detector
/// mode each frame, writes history and the latest masked frame.
pub struct FramePipeline {
    cascade: DetectionCascade,
    state: CascadeState,
    renderer: MaskRenderer,
    links: RenderLinks,
    logger: Box<dyn SessionLogger>,
    view: Option<(u32, u32)>,
    frame_skip: u32,
    history_stride: u32,
    last_detection: Option<DetectionResult>,
    skipped: u32,
    masked_frames: u64,
}

impl FramePipeline {
    pub fn new(
        cascade: DetectionCascade,
        renderer: MaskRenderer,
        links: RenderLinks,
        profile: &CapabilityProfile,
        history_stride: u32,
    ) -> Self {
        let state = CascadeState::new(cascade.settings());
        Self {
            cascade,
            state,
            renderer,
            links,
            logger: Box::new(LogSessionLogger::new()),
            view: None,
            frame_skip: profile.frame_skip,
            history_stride: history_stride.max(1),
            last_detection: None,
            skipped: 0,
            masked_frames: 0,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Display size of the preview. Until it is known frames pass through
    /// unmasked and nothing is captured.
    pub fn set_view_size(&mut self, width: u32, height: u32) {
        if self.view != Some((width, height)) {
            log::debug!("View size set to {width}x{height}");
            self.view = Some((width, height));
        }
    }

    pub fn cascade_state(&self) -> &CascadeState {
        &self.state
    }

    pub fn history(&self) -> &SharedHistory {
        &self.links.history
    }

    pub fn is_ended(&self) -> bool {
        self.links.ended.load(Ordering::Acquire)
    }

    pub fn on_frame(&mut self, frame: &Frame) -> RenderedFrame {
        let detect_start = Instant::now();
        let detection = self.detect(frame);
        let detect_ms = detect_start.elapsed().as_secs_f64() * 1000.0;

        let override_mask = self.links.overrides.current();
        let render_start = Instant::now();
        let rendered = self
            .renderer
            .render(frame, self.view, &detection, override_mask.as_deref());
        let render_ms = render_start.elapsed().as_secs_f64() * 1000.0;

        self.logger.timing("detect", detect_ms);
        self.logger.timing("render", render_ms);

        if rendered.masked {
            self.masked_frames += 1;
            if (self.masked_frames - 1) % self.history_stride as u64 == 0
                && self
                    .links
                    .history
                    .try_record(rendered.detection_regions.clone())
                    .is_none()
            {
                log::trace!("History busy, frame {} not recorded", frame.index());
            }
            self.links.snapshots.publish(RenderedSnapshot {
                frame: rendered.frame.clone(),
                override_generation: rendered.override_generation,
                method: detection.method(),
                regions: rendered.detection_regions.clone(),
            });
            self.logger.frame_presented(frame.timestamp_ms());
        }

        rendered
    }

    /// Runs the cascade on one frame in `frame_skip + 1`, reusing the
    /// previous result in between.
    fn detect(&mut self, frame: &Frame) -> DetectionResult {
        if let Some(last) = &self.last_detection {
            if self.skipped < self.frame_skip {
                self.skipped += 1;
                return last.clone();
            }
        }
        self.skipped = 0;

        let result = self
            .cascade
            .run(&mut self.state, frame, self.links.mode.get());
        if !result.is_empty() {
            self.logger.tier(result.method());
        }
        self.last_detection = Some(result.clone());
        result
    }

    /// Ends the session from the rendering side. A capture in progress on
    /// the control side is cancelled at its next wait.
    pub fn end(&mut self) {
        self.links.ended.store(true, Ordering::Release);
        self.links.history.clear();
        self.links.snapshots.clear();
        self.state.reset();
        self.last_detection = None;
        self.skipped = 0;
        self.logger.summary();
    }
}
