use crate::shared::frame::CameraFacing;
use crate::shared::region::FaceRegion;

pub const HEURISTIC_CONFIDENCE: f64 = 0.5;
pub const AGGRESSIVE_CONFIDENCE: f64 = 0.3;

// Fractions of the frame as [x, y, width, height].
const FRONT_HEURISTIC: [[f64; 4]; 2] = [[0.25, 0.40, 0.50, 0.40], [0.05, 0.45, 0.35, 0.35]];
const BACK_HEURISTIC: [[f64; 4]; 1] = [[0.30, 0.25, 0.40, 0.45]];
const FRONT_AGGRESSIVE: [f64; 4] = [0.0, 0.10, 1.0, 0.75];
const BACK_AGGRESSIVE: [f64; 4] = [0.0, 0.15, 1.0, 0.70];

/// Where faces statistically appear in a detector-space frame.
///
/// Selfies put one face low and centred with a possible second face to the
/// side; rear shots put subjects in the upper-middle third.
pub fn heuristic_regions(facing: CameraFacing, frame_w: f64, frame_h: f64) -> Vec<FaceRegion> {
    let fractions: &[[f64; 4]] = match facing {
        CameraFacing::Front => &FRONT_HEURISTIC,
        CameraFacing::Back => &BACK_HEURISTIC,
    };
    fractions
        .iter()
        .map(|f| FaceRegion::from_fractions(frame_w, frame_h, *f, HEURISTIC_CONFIDENCE))
        .collect()
}

/// A band covering the dominant portion of the frame.
pub fn aggressive_regions(facing: CameraFacing, frame_w: f64, frame_h: f64) -> Vec<FaceRegion> {
    let band = match facing {
        CameraFacing::Front => FRONT_AGGRESSIVE,
        CameraFacing::Back => BACK_AGGRESSIVE,
    };
    vec![FaceRegion::from_fractions(
        frame_w,
        frame_h,
        band,
        AGGRESSIVE_CONFIDENCE,
    )]
}
