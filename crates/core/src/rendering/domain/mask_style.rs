use crate::detection::domain::detection_result::DetectionMethod;
use crate::shared::constants::MAX_BLUR_RADIUS;

/// Corner radius for rounded-rect masks, display pixels.
pub const ROUNDED_CORNER_RADIUS: f64 = 15.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaskShape {
    Ellipse,
    RoundedRect { corner_radius: f64 },
}

/// How a region from a given cascade tier is drawn.
///
/// Less certain tiers get more padding to absorb positional error, and
/// rounded rectangles so the corners of a guessed area are covered too.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskStyle {
    /// Display pixels added on every side.
    pub padding: f64,
    pub shape: MaskShape,
}

impl MaskStyle {
    pub fn for_method(method: DetectionMethod) -> Self {
        match method {
            DetectionMethod::Primary => Self::ellipse(20.0),
            DetectionMethod::Tracked => Self::ellipse(30.0),
            DetectionMethod::Heuristic => Self::rounded(40.0),
            DetectionMethod::Aggressive => Self::rounded(50.0),
        }
    }

    fn ellipse(padding: f64) -> Self {
        Self {
            padding,
            shape: MaskShape::Ellipse,
        }
    }

    fn rounded(padding: f64) -> Self {
        Self {
            padding,
            shape: MaskShape::RoundedRect {
                corner_radius: ROUNDED_CORNER_RADIUS,
            },
        }
    }
}

/// Blur radius for a region: stronger for less trusted regions.
pub fn blur_radius_for(base_radius: u32, confidence: f64) -> u32 {
    let factor = if confidence > 0.8 {
        1.0
    } else if confidence > 0.5 {
        1.6
    } else {
        2.4
    };
    ((base_radius as f64 * factor).round() as u32).min(MAX_BLUR_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::primary(DetectionMethod::Primary, 20.0, false)]
    #[case::tracked(DetectionMethod::Tracked, 30.0, false)]
    #[case::heuristic(DetectionMethod::Heuristic, 40.0, true)]
    #[case::aggressive(DetectionMethod::Aggressive, 50.0, true)]
    fn test_style_per_method(
        #[case] method: DetectionMethod,
        #[case] padding: f64,
        #[case] rounded: bool,
    ) {
        let style = MaskStyle::for_method(method);
        assert_eq!(style.padding, padding);
        assert_eq!(matches!(style.shape, MaskShape::RoundedRect { .. }), rounded);
    }

    #[test]
    fn test_padding_grows_as_trust_drops() {
        let paddings: Vec<f64> = DetectionMethod::ALL
            .iter()
            .map(|m| MaskStyle::for_method(*m).padding)
            .collect();
        assert!(paddings.windows(2).all(|w| w[0] < w[1]));
    }

    #[rstest]
    #[case::trusted(1.0, 40)]
    #[case::medium(0.6, 64)]
    #[case::low(0.3, 96)]
    #[case::boundary_point_eight(0.8, 64)]
    fn test_blur_radius_scales_with_confidence(#[case] confidence: f64, #[case] expected: u32) {
        assert_eq!(blur_radius_for(40, confidence), expected);
    }

    #[test]
    fn test_blur_radius_is_capped() {
        assert_eq!(blur_radius_for(60, 0.1), MAX_BLUR_RADIUS);
    }
}
