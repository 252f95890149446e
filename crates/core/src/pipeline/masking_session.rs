use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::aggregation::detection_history::SharedHistory;
use crate::capture::capture_clock::CaptureClock;
use crate::capture::capture_controller::{CaptureController, CaptureOutcome, ControlLinks};
use crate::capture::detector_mode_flag::detector_mode_flag;
use crate::capture::override_slot::override_channel;
use crate::capture::rendered_frame_slot::rendered_frame_slot;
use crate::capture::still_image_sink::StillImageSink;
use crate::detection::domain::detection_cascade::DetectionCascade;
use crate::detection::domain::face_detector::DetectorSet;
use crate::profile::capability_profile::CapabilityProfile;
use crate::rendering::domain::blur_compositor::BlurCompositor;
use crate::rendering::mask_renderer::{MaskRenderer, RenderedFrame};
use crate::shared::error::{CaptureError, ConfigError};
use crate::shared::frame::Frame;

use super::frame_pipeline::{FramePipeline, RenderLinks};
use super::session_config::SessionConfig;
use super::session_logger::SessionLogger;

/// One camera-screen lifetime of the masking pipeline.
///
/// Owns both halves: the [`FramePipeline`] fed from the camera and the
/// [`CaptureController`] driven by the app. Used from one thread, a
/// capture cannot render new frames while it waits, so the controller
/// composites the override onto the latest frame itself. For live use,
/// [`MaskingSession::split`] the halves onto their own threads.
pub struct MaskingSession {
    pipeline: FramePipeline,
    controller: CaptureController,
}

impl MaskingSession {
    pub fn begin(
        profile: CapabilityProfile,
        config: SessionConfig,
        detectors: DetectorSet,
        compositor: Box<dyn BlurCompositor>,
        sink: Box<dyn StillImageSink>,
    ) -> Result<Self, ConfigError> {
        profile.validate()?;
        config.validate()?;

        if !detectors.has_accurate() {
            log::debug!("No accurate detector configured, refine pass reuses the fast one");
        }

        let (override_writer, override_reader) = override_channel();
        let (mode_switch, mode_reader) = detector_mode_flag();
        let (publisher, snapshots) = rendered_frame_slot();
        let history = SharedHistory::new(config.history_capacity);
        let ended = Arc::new(AtomicBool::new(false));

        let renderer = MaskRenderer::new(compositor, profile, config.renderer_settings());
        let capture_renderer = renderer.fork();
        let cascade = DetectionCascade::new(
            detectors,
            config.cascade_settings(profile.max_faces_to_process),
        );

        let pipeline = FramePipeline::new(
            cascade,
            renderer,
            RenderLinks {
                overrides: override_reader,
                mode: mode_reader,
                history: history.clone(),
                snapshots: publisher,
                ended: ended.clone(),
            },
            &profile,
            config.history_stride,
        );
        let controller = CaptureController::new(
            ControlLinks {
                overrides: override_writer,
                mode: mode_switch,
                history,
                snapshots,
                ended,
            },
            capture_renderer,
            sink,
            config.capture_settings(),
        );

        log::info!(
            "Masking session started (blur radius {}, max faces {}, frame skip {}, contour masks {})",
            profile.blur_radius,
            profile.max_faces_to_process,
            profile.frame_skip,
            profile.contour_masks
        );
        Ok(Self {
            pipeline,
            controller,
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn SessionLogger>) -> Self {
        self.pipeline = self.pipeline.with_logger(logger);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn CaptureClock>) -> Self {
        self.controller = self.controller.with_clock(clock);
        self
    }

    pub fn set_view_size(&mut self, width: u32, height: u32) {
        self.pipeline.set_view_size(width, height);
    }

    pub fn on_frame(&mut self, frame: &Frame) -> RenderedFrame {
        self.pipeline.on_frame(frame)
    }

    pub fn capture(&mut self) -> Result<CaptureOutcome, CaptureError> {
        self.controller.capture()
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    /// Separates the rendering half from the control half.
    pub fn split(self) -> (FramePipeline, CaptureController) {
        (self.pipeline, self.controller)
    }

    /// Clears override, detector mode, history and cascade state.
    pub fn end(mut self) {
        self.controller.end();
        self.pipeline.end();
        log::info!("Masking session ended");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::capture::still_image_sink::ImageHandle;
    use crate::detection::domain::detection_result::DetectionMethod;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::detection::infrastructure::unavailable_detector::UnavailableDetector;
    use crate::pipeline::session_logger::NullSessionLogger;
    use crate::rendering::infrastructure::cpu_blur_compositor::CpuBlurCompositor;
    use crate::shared::error::BoxError;
    use crate::shared::region::FaceRegion;

    const VIEW: (u32, u32) = (64, 48);

    fn face(x: f64) -> FaceRegion {
        FaceRegion::new(x, 15.0, 10.0, 10.0, 1.0)
    }

    /// One face until the first still is written, three afterwards.
    struct GrowingScene {
        writes: Arc<AtomicUsize>,
    }

    impl FaceDetector for GrowingScene {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, BoxError> {
            if self.writes.load(Ordering::SeqCst) == 0 {
                Ok(vec![face(2.0)])
            } else {
                Ok(vec![face(2.0), face(20.0), face(40.0)])
            }
        }
    }

    #[derive(Default)]
    struct MemorySink {
        writes: Arc<AtomicUsize>,
    }

    impl StillImageSink for MemorySink {
        fn write(&mut self, frame: &Frame) -> Result<ImageHandle, BoxError> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ImageHandle {
                location: format!("mem://{n}"),
                width: frame.width(),
                height: frame.height(),
            })
        }
    }

    /// Returns immediately; nothing renders while the control side waits.
    struct NoopClock;

    impl CaptureClock for NoopClock {
        fn wait(&mut self, _duration: Duration) {}
    }

    /// Renders one camera frame per elapsed 33ms of every wait, the way the
    /// camera thread would while the control side sleeps.
    struct CameraClock {
        pipeline: FramePipeline,
        next_index: usize,
    }

    impl CaptureClock for CameraClock {
        fn wait(&mut self, duration: Duration) {
            let frames = (duration.as_millis() as usize).div_ceil(33).max(1);
            for _ in 0..frames {
                self.pipeline.on_frame(&camera_frame(self.next_index));
                self.next_index += 1;
            }
        }
    }

    fn camera_frame(index: usize) -> Frame {
        // Vertical stripes so the blur visibly changes pixels.
        let data = (0..VIEW.0 * VIEW.1)
            .flat_map(|i| if (i % VIEW.0) % 2 == 0 { [255; 3] } else { [0; 3] })
            .collect();
        Frame::new(data, VIEW.0, VIEW.1, 3, index).with_timestamp_ms(index as u64 * 33)
    }

    fn session(detector: Box<dyn FaceDetector>, sink: MemorySink) -> MaskingSession {
        MaskingSession::begin(
            CapabilityProfile::default(),
            SessionConfig::default(),
            DetectorSet::new(detector),
            Box::new(CpuBlurCompositor::new()),
            Box::new(sink),
        )
        .unwrap()
        .with_logger(Box::new(NullSessionLogger))
    }

    #[test]
    fn test_begin_rejects_invalid_config() {
        let config = SessionConfig {
            history_capacity: 0,
            ..SessionConfig::default()
        };
        let result = MaskingSession::begin(
            CapabilityProfile::default(),
            config,
            DetectorSet::new(Box::new(UnavailableDetector)),
            Box::new(CpuBlurCompositor::new()),
            Box::new(MemorySink::default()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { field: "history_capacity", .. })));
    }

    #[test]
    fn test_frames_are_masked_once_view_is_known() {
        let mut session = session(
            Box::new(GrowingScene { writes: Arc::default() }),
            MemorySink::default(),
        );
        let before = session.on_frame(&camera_frame(0));
        assert!(!before.masked);

        session.set_view_size(VIEW.0, VIEW.1);
        let original = camera_frame(1);
        let after = session.on_frame(&original);
        assert!(after.masked);
        assert_eq!(after.detection_regions.len(), 1);
        assert_ne!(after.frame.data(), original.data());
    }

    #[test]
    fn test_dead_detector_reaches_aggressive_tier() {
        let mut session = session(Box::new(UnavailableDetector), MemorySink::default());
        session.set_view_size(VIEW.0, VIEW.1);
        let mut last = None;
        for i in 0..15 {
            last = Some(session.on_frame(&camera_frame(i)));
        }
        assert_eq!(session.pipeline().cascade_state().tier(), DetectionMethod::Aggressive);
        assert!(!last.unwrap().detection_regions.is_empty());
    }

    #[test]
    fn test_single_thread_capture_paints_override() {
        let sink = MemorySink::default();
        let writes = sink.writes.clone();
        let mut session = session(Box::new(GrowingScene { writes: writes.clone() }), sink)
            .with_clock(Box::new(NoopClock));
        session.set_view_size(VIEW.0, VIEW.1);
        for i in 0..4 {
            session.on_frame(&camera_frame(i));
        }

        let outcome = session.capture().unwrap();
        assert_eq!(outcome.captures, 1);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!((outcome.image.width, outcome.image.height), VIEW);
        session.end();
    }

    #[test]
    fn test_capture_before_view_is_not_ready() {
        let mut session = session(Box::new(UnavailableDetector), MemorySink::default())
            .with_clock(Box::new(NoopClock));
        session.on_frame(&camera_frame(0));
        assert!(matches!(session.capture(), Err(CaptureError::NotReady)));
    }

    #[test]
    fn test_growth_during_capture_writes_second_still() {
        let sink = MemorySink::default();
        let writes = sink.writes.clone();
        let mut session = session(Box::new(GrowingScene { writes: writes.clone() }), sink);
        session.set_view_size(VIEW.0, VIEW.1);
        for i in 0..6 {
            session.on_frame(&camera_frame(i));
        }

        let (pipeline, controller) = session.split();
        let mut controller = controller.with_clock(Box::new(CameraClock {
            pipeline,
            next_index: 6,
        }));
        let outcome = controller.capture().unwrap();

        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.captures, 2);
        assert_eq!(outcome.regions.len(), 3);
        assert_eq!(outcome.image.location, "mem://2");
        assert!(!controller.override_active());
    }

    #[test]
    fn test_end_then_capture_is_rejected() {
        let mut session = session(Box::new(UnavailableDetector), MemorySink::default());
        session.set_view_size(VIEW.0, VIEW.1);
        session.on_frame(&camera_frame(0));
        let (mut pipeline, mut controller) = session.split();
        pipeline.end();
        assert!(matches!(controller.capture(), Err(CaptureError::SessionEnded)));
    }
}
