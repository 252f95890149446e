use std::sync::Arc;

/// IoU above which two candidate regions are treated as the same face.
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.3;

/// A point in whichever coordinate space its owning region lives in.
pub type Point = (f64, f64);

/// A candidate face area.
///
/// The coordinate space (detector-space or display-space) is never stored on
/// the region itself; every function that produces or consumes one names the
/// space it expects. `confidence` is 1.0 for a direct ML detection and lower
/// for the fallback tiers.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub track_id: Option<u32>,
    /// Optional face outline in the same space as the box.
    pub contour: Option<Arc<[Point]>>,
}

impl FaceRegion {
    /// Negative sizes are clamped to zero and confidence to `[0, 1]`.
    pub fn new(x: f64, y: f64, width: f64, height: f64, confidence: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
            confidence: confidence.clamp(0.0, 1.0),
            track_id: None,
            contour: None,
        }
    }

    /// Builds a region from fractions of a `frame_w` x `frame_h` plane.
    pub fn from_fractions(frame_w: f64, frame_h: f64, fractions: [f64; 4], confidence: f64) -> Self {
        let [fx, fy, fw, fh] = fractions;
        Self::new(
            fx * frame_w,
            fy * frame_h,
            fw * frame_w,
            fh * frame_h,
            confidence,
        )
    }

    pub fn with_track_id(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn with_contour(mut self, points: Vec<Point>) -> Self {
        self.contour = Some(points.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// A zero-area region means "nothing to mask yet".
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn iou(&self, other: &FaceRegion) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Smallest box containing both regions. Keeps the stronger confidence
    /// and the receiver's identity; contours do not survive a merge.
    pub fn bounding_union(&self, other: &FaceRegion) -> FaceRegion {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        FaceRegion {
            x,
            y,
            width: x2 - x,
            height: y2 - y,
            confidence: self.confidence.max(other.confidence),
            track_id: self.track_id.or(other.track_id),
            contour: None,
        }
    }

    /// Bounding box of every region in the slice, or `None` when empty.
    pub fn enclosing(regions: &[FaceRegion]) -> Option<FaceRegion> {
        let (first, rest) = regions.split_first()?;
        let mut acc = first.clone();
        acc.contour = None;
        for r in rest {
            acc = acc.bounding_union(r);
        }
        Some(acc)
    }

    /// Grows the box by `pad` on every side.
    pub fn padded(&self, pad: f64) -> FaceRegion {
        FaceRegion {
            x: self.x - pad,
            y: self.y - pad,
            width: (self.width + pad * 2.0).max(0.0),
            height: (self.height + pad * 2.0).max(0.0),
            ..self.clone()
        }
    }
}
