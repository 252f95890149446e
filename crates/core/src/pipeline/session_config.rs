use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::capture_controller::CaptureSettings;
use crate::detection::domain::detection_cascade::CascadeSettings;
use crate::detection::domain::face_tracker::TrackerSettings;
use crate::rendering::mask_renderer::RendererSettings;
use crate::shared::error::ConfigError;
use crate::shared::region::DEFAULT_IOU_THRESHOLD;

/// Tunables for one masking session.
///
/// Loaded from JSON with every field optional; see [`SessionConfig::default`]
/// for the values used when a field is absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub iou_merge_threshold: f64,
    pub confidence_decay: f64,
    pub confidence_floor: f64,
    pub track_max_misses: u32,
    pub heuristic_threshold: u32,
    pub aggressive_threshold: u32,
    pub history_capacity: usize,
    /// Record every k-th masked frame into history.
    pub history_stride: u32,
    pub face_expand_x: f64,
    pub face_expand_y: f64,
    pub override_settle_ms: u64,
    pub refine_window_ms: u64,
    pub refine_poll_ms: u64,
    pub verify_growth: f64,
    pub refine_growth: f64,
    pub fallback_band_top: f64,
    pub fallback_band_height: f64,
    pub detector_deadline_ms: u64,
    pub masking_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            iou_merge_threshold: DEFAULT_IOU_THRESHOLD,
            confidence_decay: 0.1,
            confidence_floor: 0.1,
            track_max_misses: 10,
            heuristic_threshold: 5,
            aggressive_threshold: 15,
            history_capacity: 8,
            history_stride: 3,
            face_expand_x: 1.35,
            face_expand_y: 1.5,
            override_settle_ms: 120,
            refine_window_ms: 180,
            refine_poll_ms: 30,
            verify_growth: 1.15,
            refine_growth: 1.12,
            fallback_band_top: 0.15,
            fallback_band_height: 0.7,
            detector_deadline_ms: 33,
            masking_enabled: true,
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("iou_merge_threshold", self.iou_merge_threshold)?;
        check_fraction("confidence_decay", self.confidence_decay)?;
        check_fraction("confidence_floor", self.confidence_floor)?;
        check_fraction("fallback_band_top", self.fallback_band_top)?;
        check_fraction("fallback_band_height", self.fallback_band_height)?;
        if self.fallback_band_top + self.fallback_band_height > 1.0 {
            return Err(ConfigError::invalid(
                "fallback_band_height",
                "band extends past the bottom of the view",
            ));
        }
        if self.heuristic_threshold == 0 {
            return Err(ConfigError::invalid("heuristic_threshold", "must be at least 1"));
        }
        if self.aggressive_threshold < self.heuristic_threshold {
            return Err(ConfigError::invalid(
                "aggressive_threshold",
                format!(
                    "{} is below heuristic_threshold {}",
                    self.aggressive_threshold, self.heuristic_threshold
                ),
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::invalid("history_capacity", "must be at least 1"));
        }
        if self.history_stride == 0 {
            return Err(ConfigError::invalid("history_stride", "must be at least 1"));
        }
        if self.face_expand_x < 1.0 || self.face_expand_y < 1.0 {
            return Err(ConfigError::invalid("face_expand", "must not shrink boxes"));
        }
        if self.verify_growth < 1.0 {
            return Err(ConfigError::invalid("verify_growth", "must be at least 1.0"));
        }
        if self.refine_growth < 1.0 {
            return Err(ConfigError::invalid("refine_growth", "must be at least 1.0"));
        }
        if self.refine_poll_ms == 0 {
            return Err(ConfigError::invalid("refine_poll_ms", "must be positive"));
        }
        Ok(())
    }

    pub fn cascade_settings(&self, max_faces: usize) -> CascadeSettings {
        CascadeSettings {
            heuristic_threshold: self.heuristic_threshold,
            aggressive_threshold: self.aggressive_threshold,
            max_faces,
            tracker: TrackerSettings {
                confidence_decay: self.confidence_decay,
                confidence_floor: self.confidence_floor,
                max_misses: self.track_max_misses,
            },
        }
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            masking_enabled: self.masking_enabled,
            face_expand_x: self.face_expand_x,
            face_expand_y: self.face_expand_y,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            settle: Duration::from_millis(self.override_settle_ms),
            refine_window: Duration::from_millis(self.refine_window_ms),
            refine_poll: Duration::from_millis(self.refine_poll_ms),
            verify_growth: self.verify_growth,
            refine_growth: self.refine_growth,
            iou_threshold: self.iou_merge_threshold,
            fallback_band_top: self.fallback_band_top,
            fallback_band_height: self.fallback_band_height,
        }
    }

    pub fn detector_deadline(&self) -> Duration {
        Duration::from_millis(self.detector_deadline_ms)
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        SessionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_defaults_feed_component_settings() {
        let config = SessionConfig::default();
        assert_eq!(config.cascade_settings(10), CascadeSettings::default());
        assert_eq!(config.renderer_settings(), RendererSettings::default());
        assert_eq!(config.capture_settings(), CaptureSettings::default());
        assert_eq!(config.detector_deadline(), Duration::from_millis(33));
    }

    #[rstest]
    #[case::iou_above_one(SessionConfig { iou_merge_threshold: 1.5, ..SessionConfig::default() }, "iou_merge_threshold")]
    #[case::thresholds_inverted(SessionConfig { heuristic_threshold: 10, aggressive_threshold: 5, ..SessionConfig::default() }, "aggressive_threshold")]
    #[case::zero_heuristic(SessionConfig { heuristic_threshold: 0, ..SessionConfig::default() }, "heuristic_threshold")]
    #[case::zero_capacity(SessionConfig { history_capacity: 0, ..SessionConfig::default() }, "history_capacity")]
    #[case::zero_stride(SessionConfig { history_stride: 0, ..SessionConfig::default() }, "history_stride")]
    #[case::shrinking_growth(SessionConfig { verify_growth: 0.9, ..SessionConfig::default() }, "verify_growth")]
    #[case::shrinking_refine(SessionConfig { refine_growth: 0.5, ..SessionConfig::default() }, "refine_growth")]
    #[case::band_off_view(SessionConfig { fallback_band_top: 0.5, fallback_band_height: 0.7, ..SessionConfig::default() }, "fallback_band_height")]
    #[case::zero_poll(SessionConfig { refine_poll_ms: 0, ..SessionConfig::default() }, "refine_poll_ms")]
    #[case::shrinking_expand(SessionConfig { face_expand_x: 0.8, ..SessionConfig::default() }, "face_expand")]
    fn test_validate_rejects(#[case] config: SessionConfig, #[case] expected_field: &str) {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected invalid {expected_field}, got {other:?}"),
        }
    }

    #[test]
    fn test_json_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "history_capacity": 12, "masking_enabled": false }}"#).unwrap();
        let config = SessionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.history_capacity, 12);
        assert!(!config.masking_enabled);
        assert_eq!(config.aggressive_threshold, 15);
    }

    #[test]
    fn test_json_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "history_stride": 0 }}"#).unwrap();
        assert!(matches!(
            SessionConfig::from_json_file(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_json_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            SessionConfig::from_json_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SessionConfig::from_json_file(Path::new("/nonexistent/session.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
