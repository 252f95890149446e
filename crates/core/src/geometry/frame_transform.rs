use crate::shared::frame::CameraFacing;
use crate::shared::region::{FaceRegion, Point};

/// Mapping from detector-space to display-space.
///
/// Scale-to-cover: the frame is scaled until it fills the view, the
/// overflowing dimension is cropped symmetrically (negative offset) and the
/// other one is centred. `frame_width` is kept because mirroring flips about
/// the source frame, not the view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub mirrored: bool,
    pub frame_width: f64,
    pub frame_height: f64,
}

impl FrameTransform {
    /// Sets `mirrored` from the camera facing.
    pub fn for_facing(mut self, facing: CameraFacing) -> Self {
        self.mirrored = facing.is_front();
        self
    }

    /// True when either side was zero, so every mapped region collapses.
    pub fn is_degenerate(&self) -> bool {
        self.scale <= 0.0
    }
}

/// Computes the cover transform for a `frame_w` x `frame_h` sensor frame
/// shown in a `view_w` x `view_h` view. Never mirrored; see
/// [`FrameTransform::for_facing`].
pub fn compute_transform(frame_w: f64, frame_h: f64, view_w: f64, view_h: f64) -> FrameTransform {
    if frame_w <= 0.0 || frame_h <= 0.0 || view_w <= 0.0 || view_h <= 0.0 {
        return FrameTransform {
            scale: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            mirrored: false,
            frame_width: frame_w.max(0.0),
            frame_height: frame_h.max(0.0),
        };
    }

    let scale = (view_w / frame_w).max(view_h / frame_h);
    FrameTransform {
        scale,
        offset_x: (view_w - frame_w * scale) / 2.0,
        offset_y: (view_h - frame_h * scale) / 2.0,
        mirrored: false,
        frame_width: frame_w,
        frame_height: frame_h,
    }
}

/// Maps a detector-space region into display-space.
///
/// Mirroring happens before scaling: `x' = frame_w - x - width`.
pub fn map_region(region: &FaceRegion, t: &FrameTransform) -> FaceRegion {
    let x = if t.mirrored {
        t.frame_width - region.x - region.width
    } else {
        region.x
    };

    FaceRegion {
        x: x * t.scale + t.offset_x,
        y: region.y * t.scale + t.offset_y,
        width: region.width * t.scale,
        height: region.height * t.scale,
        confidence: region.confidence,
        track_id: region.track_id,
        contour: region
            .contour
            .as_ref()
            .map(|points| map_contour(points, t).into()),
    }
}

/// Display-space back to detector-space. `None` for a degenerate transform.
pub fn inverse_map_region(region: &FaceRegion, t: &FrameTransform) -> Option<FaceRegion> {
    if t.is_degenerate() {
        return None;
    }

    let width = region.width / t.scale;
    let unscaled_x = (region.x - t.offset_x) / t.scale;
    let x = if t.mirrored {
        t.frame_width - unscaled_x - width
    } else {
        unscaled_x
    };

    Some(FaceRegion {
        x,
        y: (region.y - t.offset_y) / t.scale,
        width,
        height: region.height / t.scale,
        confidence: region.confidence,
        track_id: region.track_id,
        contour: region.contour.as_ref().map(|points| {
            points
                .iter()
                .map(|&(px, py)| {
                    let ux = (px - t.offset_x) / t.scale;
                    let ux = if t.mirrored { t.frame_width - ux } else { ux };
                    (ux, (py - t.offset_y) / t.scale)
                })
                .collect::<Vec<_>>()
                .into()
        }),
    })
}

/// A single point flips to `frame_w - x` when mirrored.
pub fn map_point(point: Point, t: &FrameTransform) -> Point {
    let (x, y) = point;
    let x = if t.mirrored { t.frame_width - x } else { x };
    (x * t.scale + t.offset_x, y * t.scale + t.offset_y)
}

pub fn map_contour(points: &[Point], t: &FrameTransform) -> Vec<Point> {
    points.iter().map(|&p| map_point(p, t)).collect()
}

/// Grows a box about its centre by independent horizontal/vertical factors.
///
/// Detector boxes hug the face; the mask needs forehead, chin and ears too.
/// A contour is scaled about the same centre so it keeps covering the box.
pub fn expand_about_center(region: &FaceRegion, factor_x: f64, factor_y: f64) -> FaceRegion {
    let (cx, cy) = region.center();
    let (fx, fy) = (factor_x.max(0.0), factor_y.max(0.0));
    let width = region.width * fx;
    let height = region.height * fy;
    FaceRegion {
        x: cx - width / 2.0,
        y: cy - height / 2.0,
        width,
        height,
        contour: region.contour.as_ref().map(|points| {
            points
                .iter()
                .map(|&(px, py)| (cx + (px - cx) * fx, cy + (py - cy) * fy))
                .collect::<Vec<_>>()
                .into()
        }),
        ..region.clone()
    }
}
