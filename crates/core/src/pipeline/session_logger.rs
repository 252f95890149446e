use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::detection::domain::detection_result::DetectionMethod;
use crate::shared::constants::{EXPECTED_FRAME_INTERVAL_MS, SLOW_FRAME_THRESHOLD_MS};

/// Frames in the rolling FPS window.
const FPS_WINDOW: usize = 30;
/// Periodic debug line interval, in presented frames.
const REPORT_EVERY: u64 = 60;
/// A gap longer than this many expected intervals counts as dropped frames.
const DROP_FACTOR: f64 = 1.5;

/// Observer for rendering-context events.
///
/// Keeps the frame pipeline independent of where diagnostics end up (log
/// crate, an app's own telemetry, nowhere).
pub trait SessionLogger: Send {
    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record the cascade tier that produced a frame's mask.
    fn tier(&mut self, method: DetectionMethod);

    /// A masked frame was handed to the preview at `timestamp_ms`.
    fn frame_presented(&mut self, timestamp_ms: u64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn tier(&mut self, _method: DetectionMethod) {}
    fn frame_presented(&mut self, _timestamp_ms: u64) {}
    fn info(&mut self, _message: &str) {}
}

/// Tracks per-stage timings, tier counts, dropped frames and a rolling
/// frame rate, reporting through the `log` crate.
pub struct LogSessionLogger {
    timings: HashMap<String, Vec<f64>>,
    tiers: HashMap<DetectionMethod, u64>,
    presented: u64,
    dropped: u64,
    last_timestamp: Option<u64>,
    recent: VecDeque<u64>,
    slow_frames: u64,
    start_time: Instant,
}

impl LogSessionLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            tiers: HashMap::new(),
            presented: 0,
            dropped: 0,
            last_timestamp: None,
            recent: VecDeque::with_capacity(FPS_WINDOW),
            slow_frames: 0,
            start_time: Instant::now(),
        }
    }

    /// Frames per second over the last presented frames, from their
    /// timestamps. `None` until two frames are seen.
    pub fn rolling_fps(&self) -> Option<f64> {
        let (first, last) = (self.recent.front()?, self.recent.back()?);
        let span_ms = last.saturating_sub(*first) as f64;
        if self.recent.len() < 2 || span_ms <= 0.0 {
            return None;
        }
        Some((self.recent.len() - 1) as f64 * 1000.0 / span_ms)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    pub fn tier_count(&self, method: DetectionMethod) -> u64 {
        self.tiers.get(&method).copied().unwrap_or(0)
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    /// Returns the formatted summary string, or `None` if no frame was
    /// presented.
    pub fn summary_string(&self) -> Option<String> {
        if self.presented == 0 {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Session summary ({} frames, {} dropped, {} slow, {elapsed_s:.1}s):",
            self.presented, self.dropped, self.slow_frames
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms"
            ));
        }

        let tiered: u64 = self.tiers.values().sum();
        for method in DetectionMethod::ALL {
            let count = self.tier_count(method);
            if count > 0 {
                let pct = count as f64 / tiered as f64 * 100.0;
                lines.push(format!("  {:12}: {count} frames ({pct:4.1}%)", method.as_str()));
            }
        }

        if let Some(fps) = self.rolling_fps() {
            lines.push(format!("  Frame rate: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    fn frame_ms(&self) -> f64 {
        ["detect", "render"]
            .iter()
            .filter_map(|stage| self.timings.get(*stage).and_then(|v| v.last()))
            .sum()
    }
}

impl Default for LogSessionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLogger for LogSessionLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn tier(&mut self, method: DetectionMethod) {
        *self.tiers.entry(method).or_default() += 1;
    }

    fn frame_presented(&mut self, timestamp_ms: u64) {
        self.presented += 1;

        if let Some(previous) = self.last_timestamp {
            let gap = timestamp_ms.saturating_sub(previous) as f64;
            if gap > EXPECTED_FRAME_INTERVAL_MS * DROP_FACTOR {
                self.dropped += (gap / EXPECTED_FRAME_INTERVAL_MS).round() as u64 - 1;
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        if self.recent.len() == FPS_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(timestamp_ms);

        let frame_ms = self.frame_ms();
        if frame_ms > SLOW_FRAME_THRESHOLD_MS {
            self.slow_frames += 1;
            log::warn!("Slow frame {}: {frame_ms:.1}ms", self.presented);
        }

        if self.presented % REPORT_EVERY == 0 {
            log::debug!(
                "{} frames presented, {} dropped, {:.1} fps",
                self.presented,
                self.dropped,
                self.rolling_fps().unwrap_or(0.0)
            );
        }
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // --- NullSessionLogger ---

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullSessionLogger;
        logger.timing("detect", 5.0);
        logger.tier(DetectionMethod::Primary);
        logger.frame_presented(0);
        logger.info("hello");
        logger.summary();
    }

    // --- LogSessionLogger ---

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogSessionLogger::new();
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("render", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("render").unwrap(), &[5.0]);
        assert!(logger.timings_for("blur").is_none());
    }

    #[test]
    fn test_steady_frames_are_not_dropped() {
        let mut logger = LogSessionLogger::new();
        for i in 0..10 {
            logger.frame_presented(i * 33);
        }
        assert_eq!(logger.dropped_frames(), 0);
        assert_eq!(logger.presented_frames(), 10);
    }

    #[test]
    fn test_gap_counts_dropped_frames() {
        let mut logger = LogSessionLogger::new();
        logger.frame_presented(0);
        logger.frame_presented(100);
        // 100ms is three intervals: two frames missing.
        assert_eq!(logger.dropped_frames(), 2);
    }

    #[test]
    fn test_rolling_fps() {
        let mut logger = LogSessionLogger::new();
        assert!(logger.rolling_fps().is_none());
        for i in 0..50 {
            logger.frame_presented(i * 50);
        }
        assert_relative_eq!(logger.rolling_fps().unwrap(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tier_counts() {
        let mut logger = LogSessionLogger::new();
        logger.tier(DetectionMethod::Primary);
        logger.tier(DetectionMethod::Primary);
        logger.tier(DetectionMethod::Aggressive);
        assert_eq!(logger.tier_count(DetectionMethod::Primary), 2);
        assert_eq!(logger.tier_count(DetectionMethod::Aggressive), 1);
        assert_eq!(logger.tier_count(DetectionMethod::Tracked), 0);
    }

    #[test]
    fn test_slow_frames_counted() {
        let mut logger = LogSessionLogger::new();
        logger.timing("detect", 40.0);
        logger.timing("render", 20.0);
        logger.frame_presented(0);
        logger.timing("detect", 10.0);
        logger.timing("render", 10.0);
        logger.frame_presented(33);
        assert_eq!(logger.slow_frames, 1);
    }

    #[test]
    fn test_summary_includes_stages_and_tiers() {
        let mut logger = LogSessionLogger::new();
        logger.timing("detect", 12.0);
        logger.timing("render", 4.0);
        logger.tier(DetectionMethod::Heuristic);
        logger.frame_presented(0);
        logger.frame_presented(33);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Session summary"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("render"));
        assert!(summary.contains("heuristic"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = LogSessionLogger::new();
        assert!(logger.summary_string().is_none());
    }
}
