use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::detection::domain::face_detector::DetectorMode;

/// Creates the accurate-mode flag shared between the control context
/// (switch) and the rendering context (reader).
pub fn detector_mode_flag() -> (DetectorModeSwitch, DetectorModeReader) {
    let flag = Arc::new(AtomicBool::new(false));
    (
        DetectorModeSwitch { flag: flag.clone() },
        DetectorModeReader { flag },
    )
}

pub struct DetectorModeSwitch {
    flag: Arc<AtomicBool>,
}

impl DetectorModeSwitch {
    pub fn set(&self, mode: DetectorMode) {
        let accurate = mode == DetectorMode::Accurate;
        if self.flag.swap(accurate, Ordering::Release) != accurate {
            log::debug!("Detector mode switched to {mode:?}");
        }
    }

    pub fn current(&self) -> DetectorMode {
        mode_of(&self.flag)
    }
}

fn mode_of(flag: &AtomicBool) -> DetectorMode {
    if flag.load(Ordering::Acquire) {
        DetectorMode::Accurate
    } else {
        DetectorMode::Fast
    }
}

pub struct DetectorModeReader {
    flag: Arc<AtomicBool>,
}

impl DetectorModeReader {
    pub fn get(&self) -> DetectorMode {
        mode_of(&self.flag)
    }
}
