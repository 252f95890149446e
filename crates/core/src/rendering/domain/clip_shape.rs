use crate::shared::region::{FaceRegion, Point};

/// Display-space area a blur is restricted to.
#[derive(Clone, Debug, PartialEq)]
pub enum ClipShape {
    /// Ellipse inscribed in a box.
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
    RoundedRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        radius: f64,
    },
    /// Closed polygon, even-odd fill.
    Polygon(Vec<Point>),
    /// Every point covered by any member.
    Union(Vec<ClipShape>),
}

impl ClipShape {
    pub fn ellipse_in(region: &FaceRegion) -> Self {
        let (cx, cy) = region.center();
        ClipShape::Ellipse {
            cx,
            cy,
            rx: region.width / 2.0,
            ry: region.height / 2.0,
        }
    }

    /// Corner radius is clamped to half the shorter side.
    pub fn rounded_rect(region: &FaceRegion, radius: f64) -> Self {
        ClipShape::RoundedRect {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            radius: radius.clamp(0.0, region.width.min(region.height) / 2.0),
        }
    }

    /// Polygon from every `step`-th contour point, always closing on the
    /// last one, pushed out from its centroid by `padding`.
    ///
    /// Returns `None` for fewer than three usable points.
    pub fn polygon(contour: &[Point], step: usize, padding: f64) -> Option<Self> {
        let step = step.max(1);
        let mut points: Vec<Point> = contour.iter().step_by(step).copied().collect();
        if let Some(&last) = contour.last() {
            if points.last() != Some(&last) {
                points.push(last);
            }
        }
        if points.len() < 3 {
            return None;
        }

        let n = points.len() as f64;
        let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
        let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
        let expanded = points
            .into_iter()
            .map(|(x, y)| {
                let (dx, dy) = (x - cx, y - cy);
                let len = (dx * dx + dy * dy).sqrt();
                if len <= f64::EPSILON {
                    (x, y)
                } else {
                    (x + dx / len * padding, y + dy / len * padding)
                }
            })
            .collect();
        Some(ClipShape::Polygon(expanded))
    }

    /// Axis-aligned bounds as `(x0, y0, x1, y1)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self {
            ClipShape::Ellipse { cx, cy, rx, ry } => (cx - rx, cy - ry, cx + rx, cy + ry),
            ClipShape::RoundedRect {
                x,
                y,
                width,
                height,
                ..
            } => (*x, *y, x + width, y + height),
            ClipShape::Polygon(points) => points.iter().fold(
                (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
                |(x0, y0, x1, y1), &(px, py)| (x0.min(px), y0.min(py), x1.max(px), y1.max(py)),
            ),
            ClipShape::Union(shapes) => shapes
                .iter()
                .filter(|shape| !shape.is_empty())
                .map(ClipShape::bounds)
                .fold(
                    (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
                    |(x0, y0, x1, y1), (a0, b0, a1, b1)| {
                        (x0.min(a0), y0.min(b0), x1.max(a1), y1.max(b1))
                    },
                ),
        }
    }

    pub fn is_empty(&self) -> bool {
        let (x0, y0, x1, y1) = self.bounds();
        !(x1 > x0 && y1 > y0)
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        match self {
            ClipShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return false;
                }
                let dx = (px - cx) / rx;
                let dy = (py - cy) / ry;
                dx * dx + dy * dy <= 1.0
            }
            ClipShape::RoundedRect {
                x,
                y,
                width,
                height,
                radius,
            } => {
                if px < *x || py < *y || px > x + width || py > y + height {
                    return false;
                }
                // Distance to the nearest corner circle centre, if in a corner.
                let qx = (px - x).min(x + width - px);
                let qy = (py - y).min(y + height - py);
                if qx >= *radius || qy >= *radius {
                    return true;
                }
                let dx = radius - qx;
                let dy = radius - qy;
                dx * dx + dy * dy <= radius * radius
            }
            ClipShape::Polygon(points) => {
                if points.len() < 3 {
                    return false;
                }
                let mut inside = false;
                let mut j = points.len() - 1;
                for i in 0..points.len() {
                    let (xi, yi) = points[i];
                    let (xj, yj) = points[j];
                    if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                        inside = !inside;
                    }
                    j = i;
                }
                inside
            }
            ClipShape::Union(shapes) => shapes.iter().any(|shape| shape.contains(px, py)),
        }
    }
}
