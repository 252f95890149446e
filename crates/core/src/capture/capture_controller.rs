use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregation::detection_history::{flatten, SharedHistory};
use crate::aggregation::region_union::{compute_union, coverage_grew, total_area};
use crate::detection::domain::detection_result::DetectionMethod;
use crate::detection::domain::face_detector::DetectorMode;
use crate::detection::domain::face_prior::AGGRESSIVE_CONFIDENCE;
use crate::rendering::mask_renderer::MaskRenderer;
use crate::shared::error::CaptureError;
use crate::shared::region::{FaceRegion, DEFAULT_IOU_THRESHOLD};

use super::capture_clock::{CaptureClock, SystemClock};
use super::detector_mode_flag::DetectorModeSwitch;
use super::override_slot::{OverrideMask, OverrideWriter};
use super::rendered_frame_slot::SnapshotReader;
use super::still_image_sink::{ImageHandle, StillImageSink};

/// Extra settle periods to wait for the renderer to apply an override
/// before compositing it onto the capture directly.
const MAX_EXTRA_SETTLES: u32 = 2;

/// Timing and growth tolerances of the capture protocol.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureSettings {
    /// Wait after publishing an override.
    pub settle: Duration,
    /// How long the accurate detector runs before the refine union.
    pub refine_window: Duration,
    pub refine_poll: Duration,
    /// Area growth factor after capture that triggers a recapture.
    pub verify_growth: f64,
    /// Area growth factor of the accurate pass over the verify pass.
    pub refine_growth: f64,
    pub iou_threshold: f64,
    /// Empty-burst band: top edge and height as fractions of view height.
    pub fallback_band_top: f64,
    pub fallback_band_height: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(120),
            refine_window: Duration::from_millis(180),
            refine_poll: Duration::from_millis(30),
            verify_growth: 1.15,
            refine_growth: 1.12,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            fallback_band_top: 0.15,
            fallback_band_height: 0.7,
        }
    }
}

impl CaptureSettings {
    /// Full-width band over the vertical middle of the view.
    pub fn fallback_band(&self, view_w: u32, view_h: u32) -> FaceRegion {
        FaceRegion::from_fractions(
            view_w as f64,
            view_h as f64,
            [0.0, self.fallback_band_top, 1.0, self.fallback_band_height],
            AGGRESSIVE_CONFIDENCE,
        )
    }

    /// Number of poll waits that make up the refine window.
    pub fn refine_polls(&self) -> u32 {
        let poll = self.refine_poll.as_nanos();
        if poll == 0 {
            return 1;
        }
        let polls = self.refine_window.as_nanos().div_ceil(poll);
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

/// Result of a completed capture.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureOutcome {
    /// The final (best-masked) still.
    pub image: ImageHandle,
    /// Number of stills written, including recaptures.
    pub captures: u32,
    /// Cascade tier live on the frame behind `image`.
    pub method_at_capture: DetectionMethod,
    /// Display-space override regions composited into `image`.
    pub regions: Vec<FaceRegion>,
}

/// Control-side ends of the channels shared with the rendering context.
pub struct ControlLinks {
    pub overrides: OverrideWriter,
    pub mode: DetectorModeSwitch,
    pub history: SharedHistory,
    pub snapshots: SnapshotReader,
    /// Set when either half of the session ends.
    pub ended: Arc<AtomicBool>,
}

struct Signals {
    overrides: OverrideWriter,
    mode: DetectorModeSwitch,
    ended: Arc<AtomicBool>,
}

impl Signals {
    fn ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.overrides.clear();
        self.mode.set(DetectorMode::Fast);
    }
}

/// Clears the override and returns to fast mode on every exit path.
struct CaptureGuard<'a> {
    signals: &'a Signals,
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.signals.reset();
    }
}

struct Still {
    image: ImageHandle,
    method: DetectionMethod,
}

struct CaptureIo {
    history: SharedHistory,
    snapshots: SnapshotReader,
    renderer: MaskRenderer,
    sink: Box<dyn StillImageSink>,
    clock: Box<dyn CaptureClock>,
}

impl CaptureIo {
    fn wait(&mut self, duration: Duration, signals: &Signals) -> Result<(), CaptureError> {
        self.clock.wait(duration);
        if signals.ended() {
            log::info!("Capture cancelled: session ended");
            return Err(CaptureError::Cancelled);
        }
        Ok(())
    }

    /// Union over history entries after `sequence`, or the whole ring when
    /// nothing new was recorded.
    fn union_since(&self, sequence: u64, iou_threshold: f64) -> Vec<FaceRegion> {
        let mut entries = self.history.since(sequence);
        if entries.is_empty() {
            entries = self.history.snapshot();
        }
        compute_union(&flatten(&entries), iou_threshold)
    }

    /// Hands the latest rendered frame to the sink, making sure it carries
    /// `mask`.
    fn take_still(
        &mut self,
        mask: &OverrideMask,
        settle: Duration,
        signals: &Signals,
    ) -> Result<Still, CaptureError> {
        let mut snapshot = self.snapshots.latest().ok_or(CaptureError::NotReady)?;
        let mut extra = 0;
        while !snapshot.carries_override(mask.generation) && extra < MAX_EXTRA_SETTLES {
            self.wait(settle, signals)?;
            extra += 1;
            snapshot = self.snapshots.latest().ok_or(CaptureError::NotReady)?;
        }

        let mut frame = snapshot.frame.clone();
        if !snapshot.carries_override(mask.generation) {
            log::debug!(
                "Override {} not rendered in time, compositing it onto the capture",
                mask.generation
            );
            self.renderer.paint_override(&mut frame, mask);
        }

        let image = self.sink.write(&frame).map_err(CaptureError::Sink)?;
        Ok(Still {
            image,
            method: snapshot.method,
        })
    }

    /// Publishes a grown override and captures again. A sink failure here
    /// keeps the previous image.
    fn recapture(
        &mut self,
        signals: &Signals,
        settings: &CaptureSettings,
        regions: &[FaceRegion],
        fallback: Option<FaceRegion>,
        outcome: &mut CaptureOutcome,
    ) -> Result<(), CaptureError> {
        let mask = signals.overrides.publish(regions.to_vec(), fallback);
        self.wait(settings.settle, signals)?;
        match self.take_still(&mask, settings.settle, signals) {
            Ok(still) => {
                outcome.image = still.image;
                outcome.method_at_capture = still.method;
                outcome.regions = regions.to_vec();
                outcome.captures += 1;
                Ok(())
            }
            Err(CaptureError::Sink(e)) => {
                log::warn!("Recapture failed, keeping the previous image: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Drives the burst-refine capture protocol from the control context.
pub struct CaptureController {
    signals: Signals,
    io: CaptureIo,
    settings: CaptureSettings,
}

impl CaptureController {
    pub fn new(
        links: ControlLinks,
        renderer: MaskRenderer,
        sink: Box<dyn StillImageSink>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            signals: Signals {
                overrides: links.overrides,
                mode: links.mode,
                ended: links.ended,
            },
            io: CaptureIo {
                history: links.history,
                snapshots: links.snapshots,
                renderer,
                sink,
                clock: Box::new(SystemClock),
            },
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn CaptureClock>) -> Self {
        self.io.clock = clock;
        self
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn override_active(&self) -> bool {
        self.signals.overrides.is_active()
    }

    pub fn detector_mode(&self) -> DetectorMode {
        self.signals.mode.current()
    }

    /// Captures a masked still.
    ///
    /// Publishes the union of recent detections as an override, captures,
    /// then re-checks coverage after the capture and again with the
    /// accurate detector, recapturing when either pass finds materially
    /// more. Recapture failures keep the best image so far; only a failure
    /// of the first write is reported.
    pub fn capture(&mut self) -> Result<CaptureOutcome, CaptureError> {
        let signals = &self.signals;
        let io = &mut self.io;
        let settings = self.settings;

        if signals.ended() {
            return Err(CaptureError::SessionEnded);
        }
        let _guard = CaptureGuard { signals };
        signals.mode.set(DetectorMode::Fast);

        let latest = io.snapshots.latest().ok_or(CaptureError::NotReady)?;
        let burst = compute_union(&flatten(&io.history.snapshot()), settings.iou_threshold);
        let fallback = if burst.is_empty() {
            log::info!("No recent detections, masking the fallback band");
            Some(settings.fallback_band(latest.frame.width(), latest.frame.height()))
        } else {
            None
        };

        let mask = signals.overrides.publish(burst.clone(), fallback.clone());
        io.wait(settings.settle, signals)?;
        let first = io.take_still(&mask, settings.settle, signals)?;
        let capture_sequence = io.history.last_sequence();
        let mut outcome = CaptureOutcome {
            image: first.image,
            captures: 1,
            method_at_capture: first.method,
            regions: burst.clone(),
        };

        io.wait(settings.settle, signals)?;
        let verify = io.union_since(capture_sequence, settings.iou_threshold);
        let mut covered = compute_union(&[burst.as_slice(), verify.as_slice()].concat(), settings.iou_threshold);
        if coverage_grew(&burst, &verify, settings.verify_growth) {
            log::info!(
                "Coverage grew after capture ({} -> {} regions, area {:.0} -> {:.0}), recapturing",
                burst.len(),
                verify.len(),
                total_area(&burst),
                total_area(&verify)
            );
            io.recapture(signals, &settings, &covered, fallback.clone(), &mut outcome)?;
        }

        signals.mode.set(DetectorMode::Accurate);
        let refine_start = io.history.last_sequence();
        for _ in 0..settings.refine_polls() {
            io.wait(settings.refine_poll, signals)?;
        }
        let refine = io.union_since(refine_start, settings.iou_threshold);
        if coverage_grew(&verify, &refine, settings.refine_growth) {
            log::info!(
                "Accurate pass found more coverage ({} -> {} regions), recapturing",
                verify.len(),
                refine.len()
            );
            covered = compute_union(&[covered.as_slice(), refine.as_slice()].concat(), settings.iou_threshold);
            io.recapture(signals, &settings, &covered, fallback, &mut outcome)?;
        }

        log::info!(
            "Captured {} after {} pass(es), {} region(s) masked",
            outcome.image.location,
            outcome.captures,
            outcome.regions.len()
        );
        Ok(outcome)
    }

    /// Ends the session from the control side: no further captures, override
    /// cleared, fast mode restored.
    pub fn end(&mut self) {
        self.signals.ended.store(true, Ordering::Release);
        self.signals.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use super::*;
    use crate::capture::detector_mode_flag::{detector_mode_flag, DetectorModeReader};
    use crate::capture::override_slot::{override_channel, OverrideReader};
    use crate::capture::rendered_frame_slot::{rendered_frame_slot, RenderedSnapshot, SnapshotPublisher};
    use crate::profile::capability_profile::CapabilityProfile;
    use crate::rendering::domain::blur_compositor::BlurCompositor;
    use crate::rendering::domain::clip_shape::ClipShape;
    use crate::rendering::mask_renderer::RendererSettings;
    use crate::shared::error::BoxError;
    use crate::shared::frame::Frame;

    type Scene = Box<dyn Fn(usize, DetectorMode) -> Vec<FaceRegion> + Send>;

    fn face(x: f64) -> FaceRegion {
        FaceRegion::new(x, 10.0, 20.0, 20.0, 1.0)
    }

    /// Stands in for the rendering context: every wait renders one frame of
    /// the scene into history and the snapshot slot.
    struct SceneClock {
        scene: Scene,
        writes: Arc<AtomicUsize>,
        history: SharedHistory,
        publisher: SnapshotPublisher,
        overrides: OverrideReader,
        mode: DetectorModeReader,
        apply_override: bool,
        seen_masks: Arc<Mutex<Vec<Arc<OverrideMask>>>>,
        end_after: Option<(usize, Arc<AtomicBool>)>,
        waits: usize,
    }

    impl SceneClock {
        fn render(&mut self) {
            let regions = (self.scene)(self.writes.load(Ordering::SeqCst), self.mode.get());
            let mask = self.overrides.current();
            if let Some(mask) = &mask {
                self.seen_masks.lock().unwrap().push(mask.clone());
            }
            self.history.try_record(regions.clone());
            self.publisher.publish(RenderedSnapshot {
                frame: Frame::filled(100, 100, 0, self.waits),
                override_generation: mask.filter(|_| self.apply_override).map(|m| m.generation),
                method: DetectionMethod::Primary,
                regions,
            });
        }
    }

    impl CaptureClock for SceneClock {
        fn wait(&mut self, _duration: Duration) {
            self.waits += 1;
            if let Some((after, flag)) = &self.end_after {
                if self.waits >= *after {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            self.render();
        }
    }

    /// Counts writes; fails the writes whose 1-based number is listed.
    struct MemorySink {
        writes: Arc<AtomicUsize>,
        fail_on: Vec<usize>,
    }

    impl StillImageSink for MemorySink {
        fn write(&mut self, frame: &Frame) -> Result<ImageHandle, BoxError> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&n) {
                return Err("disk full".into());
            }
            Ok(ImageHandle {
                location: format!("mem://{n}"),
                width: frame.width(),
                height: frame.height(),
            })
        }
    }

    #[derive(Clone, Default)]
    struct CountingCompositor {
        calls: Arc<AtomicUsize>,
    }

    impl BlurCompositor for CountingCompositor {
        fn composite(&mut self, _frame: &mut Frame, _clip: &ClipShape, _radius: u32) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn fork(&self) -> Box<dyn BlurCompositor> {
            Box::new(self.clone())
        }
    }

    struct Harness {
        controller: CaptureController,
        writes: Arc<AtomicUsize>,
        seen_masks: Arc<Mutex<Vec<Arc<OverrideMask>>>>,
        paints: Arc<AtomicUsize>,
    }

    struct Setup {
        scene: Scene,
        warmup: usize,
        apply_override: bool,
        fail_on: Vec<usize>,
        end_after: Option<usize>,
    }

    impl Setup {
        fn new(scene: Scene) -> Self {
            Self {
                scene,
                warmup: 3,
                apply_override: true,
                fail_on: Vec::new(),
                end_after: None,
            }
        }

        fn build(self) -> Harness {
            let (writer, reader) = override_channel();
            let (switch, mode_reader) = detector_mode_flag();
            let (publisher, snapshots) = rendered_frame_slot();
            let history = SharedHistory::new(8);
            let ended = Arc::new(AtomicBool::new(false));
            let writes = Arc::new(AtomicUsize::new(0));
            let seen_masks = Arc::new(Mutex::new(Vec::new()));

            let mut clock = SceneClock {
                scene: self.scene,
                writes: writes.clone(),
                history: history.clone(),
                publisher,
                overrides: reader,
                mode: mode_reader,
                apply_override: self.apply_override,
                seen_masks: seen_masks.clone(),
                end_after: self.end_after.map(|n| (n, ended.clone())),
                waits: 0,
            };
            for _ in 0..self.warmup {
                clock.render();
            }

            let compositor = CountingCompositor::default();
            let paints = compositor.calls.clone();
            let renderer = MaskRenderer::new(
                Box::new(compositor),
                CapabilityProfile::default(),
                RendererSettings::default(),
            );
            let links = ControlLinks {
                overrides: writer,
                mode: switch,
                history,
                snapshots,
                ended,
            };
            let sink = MemorySink {
                writes: writes.clone(),
                fail_on: self.fail_on,
            };
            let controller = CaptureController::new(links, renderer, Box::new(sink), CaptureSettings::default())
                .with_clock(Box::new(clock));

            Harness {
                controller,
                writes,
                seen_masks,
                paints,
            }
        }
    }

    fn assert_reset(controller: &CaptureController) {
        assert!(!controller.override_active());
        assert_eq!(controller.detector_mode(), DetectorMode::Fast);
    }

    // ── Settings ──

    #[test]
    fn test_refine_polls_rounds_up() {
        let settings = CaptureSettings::default();
        assert_eq!(settings.refine_polls(), 6);
        let settings = CaptureSettings {
            refine_window: Duration::from_millis(100),
            ..settings
        };
        assert_eq!(settings.refine_polls(), 4);
    }

    #[test]
    fn test_fallback_band_covers_middle_of_view() {
        let band = CaptureSettings::default().fallback_band(390, 844);
        assert_eq!(band.x, 0.0);
        assert_eq!(band.width, 390.0);
        assert!((band.y - 126.6).abs() < 1e-9);
        assert!((band.height - 590.8).abs() < 1e-9);
    }

    // ── Protocol ──

    #[test]
    fn test_stable_scene_captures_once() {
        let mut h = Setup::new(Box::new(|_, _| vec![face(10.0)])).build();
        let outcome = h.controller.capture().unwrap();

        assert_eq!(outcome.captures, 1);
        assert_eq!(h.writes.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.image.location, "mem://1");
        assert_reset(&h.controller);
    }

    #[test]
    fn test_growth_after_capture_triggers_recapture() {
        let scene: Scene = Box::new(|writes, _| {
            if writes == 0 {
                vec![face(10.0)]
            } else {
                vec![face(10.0), face(40.0), face(70.0)]
            }
        });
        let mut h = Setup::new(scene).build();
        let outcome = h.controller.capture().unwrap();

        assert_eq!(h.writes.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.captures, 2);
        assert_eq!(outcome.regions.len(), 3);
        assert_eq!(outcome.image.location, "mem://2");

        let masks = h.seen_masks.lock().unwrap();
        assert_eq!(masks.first().unwrap().regions.len(), 1);
        assert_eq!(masks.last().unwrap().regions.len(), 3);
        assert_reset(&h.controller);
    }

    #[test]
    fn test_accurate_pass_growth_triggers_recapture() {
        let scene: Scene = Box::new(|_, mode| match mode {
            DetectorMode::Fast => vec![face(10.0)],
            DetectorMode::Accurate => vec![face(10.0), face(60.0)],
        });
        let mut h = Setup::new(scene).build();
        let outcome = h.controller.capture().unwrap();

        assert_eq!(outcome.captures, 2);
        assert_eq!(outcome.regions.len(), 2);
        assert_reset(&h.controller);
    }

    #[test]
    fn test_empty_history_uses_fallback_band() {
        let mut h = Setup::new(Box::new(|_, _| Vec::new())).build();
        let outcome = h.controller.capture().unwrap();

        assert_eq!(outcome.captures, 1);
        assert!(outcome.regions.is_empty());
        let masks = h.seen_masks.lock().unwrap();
        let band = masks[0].fallback.as_ref().unwrap();
        assert_eq!(band.width, 100.0);
        assert!((band.y - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_not_ready_before_first_render() {
        let mut setup = Setup::new(Box::new(|_, _| vec![face(10.0)]));
        setup.warmup = 0;
        let mut h = setup.build();
        let err = h.controller.capture().unwrap_err();
        assert!(matches!(err, CaptureError::NotReady));
        assert!(err.is_retryable());
        assert_reset(&h.controller);
    }

    #[test]
    fn test_lagging_renderer_gets_override_painted() {
        let mut setup = Setup::new(Box::new(|_, _| vec![face(10.0)]));
        setup.apply_override = false;
        let mut h = setup.build();
        let outcome = h.controller.capture().unwrap();

        assert_eq!(outcome.captures, 1);
        assert!(h.paints.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_rendered_override_is_not_painted_again() {
        let mut h = Setup::new(Box::new(|_, _| vec![face(10.0)])).build();
        h.controller.capture().unwrap();
        assert_eq!(h.paints.load(Ordering::SeqCst), 0);
    }

    // ── Failures ──

    #[test]
    fn test_first_sink_failure_is_reported() {
        let mut setup = Setup::new(Box::new(|_, _| vec![face(10.0)]));
        setup.fail_on = vec![1];
        let mut h = setup.build();
        let err = h.controller.capture().unwrap_err();
        assert!(matches!(err, CaptureError::Sink(_)));
        assert!(err.is_retryable());
        assert_reset(&h.controller);
    }

    #[test]
    fn test_recapture_failure_keeps_first_image() {
        let scene: Scene = Box::new(|writes, _| {
            if writes == 0 {
                vec![face(10.0)]
            } else {
                vec![face(10.0), face(40.0), face(70.0)]
            }
        });
        let mut setup = Setup::new(scene);
        setup.fail_on = vec![2];
        let mut h = setup.build();
        let outcome = h.controller.capture().unwrap();

        assert_eq!(outcome.captures, 1);
        assert_eq!(outcome.image.location, "mem://1");
        assert_eq!(outcome.regions.len(), 1);
    }

    #[test]
    fn test_session_end_mid_protocol_cancels() {
        let mut setup = Setup::new(Box::new(|_, _| vec![face(10.0)]));
        setup.end_after = Some(2);
        let mut h = setup.build();
        let err = h.controller.capture().unwrap_err();
        assert!(matches!(err, CaptureError::Cancelled));
        assert!(!err.is_retryable());
        assert_reset(&h.controller);
    }

    #[test]
    fn test_capture_after_end_is_rejected() {
        let mut h = Setup::new(Box::new(|_, _| vec![face(10.0)])).build();
        h.controller.end();
        assert!(matches!(h.controller.capture(), Err(CaptureError::SessionEnded)));
        assert_eq!(h.writes.load(Ordering::SeqCst), 0);
    }
}
