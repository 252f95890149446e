use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::shared::error::ConfigError;

const GIB: u64 = 1024 * 1024 * 1024;

/// Devices released in or after this year count as "recent".
const RECENT_DEVICE_YEAR: u16 = 2020;

/// Coarse capability facts about the device, read once per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTierSignal {
    pub total_memory_bytes: u64,
    pub device_year: u16,
}

impl DeviceTierSignal {
    pub fn tier(&self) -> DeviceTier {
        if self.total_memory_bytes > 4 * GIB {
            DeviceTier::High
        } else if self.device_year >= RECENT_DEVICE_YEAR {
            DeviceTier::Recent
        } else {
            DeviceTier::Low
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    High,
    Recent,
    Low,
}

/// How the face detector trades recall for speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorPerformanceMode {
    Fast,
    Balanced,
    Accurate,
}

impl DetectorPerformanceMode {
    /// Minimum detector score kept in this mode. Lower thresholds find more
    /// faces at the cost of false positives, which only ever over-mask.
    pub fn confidence_threshold(self) -> f64 {
        match self {
            DetectorPerformanceMode::Fast => 0.5,
            DetectorPerformanceMode::Balanced => 0.4,
            DetectorPerformanceMode::Accurate => 0.3,
        }
    }
}

/// Static per-session tuning, chosen from the device tier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityProfile {
    /// Base blur radius in display pixels.
    pub blur_radius: u32,
    pub max_faces_to_process: usize,
    /// Use every n-th contour point when building contour masks.
    pub contour_sampling_step: usize,
    /// Frames reusing the previous detection between cascade runs.
    pub frame_skip: u32,
    /// Mask along face contours when available instead of bounding ellipses.
    pub contour_masks: bool,
    pub detector_performance_mode: DetectorPerformanceMode,
}

impl CapabilityProfile {
    pub fn for_tier(tier: DeviceTier) -> Self {
        match tier {
            DeviceTier::High => Self {
                blur_radius: 60,
                max_faces_to_process: 10,
                contour_sampling_step: 1,
                frame_skip: 0,
                contour_masks: true,
                detector_performance_mode: DetectorPerformanceMode::Fast,
            },
            DeviceTier::Recent => Self {
                blur_radius: 45,
                max_faces_to_process: 5,
                contour_sampling_step: 2,
                frame_skip: 1,
                contour_masks: true,
                detector_performance_mode: DetectorPerformanceMode::Balanced,
            },
            DeviceTier::Low => Self {
                blur_radius: 45,
                max_faces_to_process: 3,
                contour_sampling_step: 3,
                frame_skip: 2,
                contour_masks: false,
                detector_performance_mode: DetectorPerformanceMode::Balanced,
            },
        }
    }

    pub fn from_signal(signal: &DeviceTierSignal) -> Self {
        let tier = signal.tier();
        log::info!(
            "Device tier {tier:?} ({} MiB, {})",
            signal.total_memory_bytes / (1024 * 1024),
            signal.device_year
        );
        Self::for_tier(tier)
    }

    /// Loads a profile from JSON; missing fields take the high-tier values.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let profile: Self = serde_json::from_str(&text)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blur_radius == 0 {
            return Err(ConfigError::invalid("blur_radius", "must be positive"));
        }
        if self.max_faces_to_process == 0 {
            return Err(ConfigError::invalid(
                "max_faces_to_process",
                "must be at least 1",
            ));
        }
        if self.contour_sampling_step == 0 {
            return Err(ConfigError::invalid(
                "contour_sampling_step",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::for_tier(DeviceTier::High)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::lots_of_memory(6 * GIB, 2016, DeviceTier::High)]
    #[case::exactly_four_gib(4 * GIB, 2019, DeviceTier::Low)]
    #[case::recent_small(3 * GIB, 2020, DeviceTier::Recent)]
    #[case::old_small(2 * GIB, 2017, DeviceTier::Low)]
    fn test_tier_from_signal(#[case] memory: u64, #[case] year: u16, #[case] expected: DeviceTier) {
        let signal = DeviceTierSignal {
            total_memory_bytes: memory,
            device_year: year,
        };
        assert_eq!(signal.tier(), expected);
    }

    #[rstest]
    #[case::high(DeviceTier::High, 60, 10, 1, 0, true)]
    #[case::recent(DeviceTier::Recent, 45, 5, 2, 1, true)]
    #[case::low(DeviceTier::Low, 45, 3, 3, 2, false)]
    fn test_profile_per_tier(
        #[case] tier: DeviceTier,
        #[case] radius: u32,
        #[case] faces: usize,
        #[case] step: usize,
        #[case] skip: u32,
        #[case] contours: bool,
    ) {
        let p = CapabilityProfile::for_tier(tier);
        assert_eq!(p.blur_radius, radius);
        assert_eq!(p.max_faces_to_process, faces);
        assert_eq!(p.contour_sampling_step, step);
        assert_eq!(p.frame_skip, skip);
        assert_eq!(p.contour_masks, contours);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_accurate_mode_has_lowest_threshold() {
        assert!(
            DetectorPerformanceMode::Accurate.confidence_threshold()
                < DetectorPerformanceMode::Fast.confidence_threshold()
        );
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{"blur_radius": 30, "contour_masks": false}"#).unwrap();
        let p = CapabilityProfile::from_json_file(&path).unwrap();
        assert_eq!(p.blur_radius, 30);
        assert!(!p.contour_masks);
        assert_eq!(p.max_faces_to_process, 10);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{"contour_sampling_step": 0}"#).unwrap();
        let err = CapabilityProfile::from_json_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "contour_sampling_step",
                ..
            }
        ));
    }

    #[test]
    fn test_from_json_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            CapabilityProfile::from_json_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
