use crate::capture::override_slot::OverrideMask;
use crate::detection::domain::detection_result::{DetectionMethod, DetectionResult};
use crate::detection::domain::face_prior::{AGGRESSIVE_CONFIDENCE, HEURISTIC_CONFIDENCE};
use crate::geometry::frame_transform::{expand_about_center, map_region, FrameTransform};
use crate::geometry::transform_cache::TransformCache;
use crate::profile::capability_profile::CapabilityProfile;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

use super::base_layer::cover_base_layer;
use super::domain::blur_compositor::{fill_clip, BlurCompositor};
use super::domain::clip_shape::ClipShape;
use super::domain::mask_style::{blur_radius_for, MaskShape, MaskStyle};

/// Flat colour painted over a clip when the compositor fails.
const FALLBACK_FILL: [u8; 3] = [128, 128, 128];

/// Renderer switches taken from the session config.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererSettings {
    pub masking_enabled: bool,
    /// Horizontal growth of primary/tracked boxes about their centre.
    pub face_expand_x: f64,
    pub face_expand_y: f64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            masking_enabled: true,
            face_expand_x: 1.35,
            face_expand_y: 1.5,
        }
    }
}

/// Output of one render pass.
#[derive(Clone, Debug)]
pub struct RenderedFrame {
    /// Display-space frame, or the untouched sensor frame when the view
    /// size is not known yet.
    pub frame: Frame,
    /// Display-space regions masked from live detection (before padding).
    pub detection_regions: Vec<FaceRegion>,
    pub override_generation: Option<u64>,
    /// False for pass-through frames (no view size, masking disabled).
    pub masked: bool,
}

struct PlannedMask {
    clip: ClipShape,
    radius: u32,
}

/// Draws the base layer and composites a blur over every active region.
///
/// Regions are independent and additive: each blur is written only inside
/// its own clip, so a later region never restores pixels an earlier one
/// blurred.
pub struct MaskRenderer {
    compositor: Box<dyn BlurCompositor>,
    profile: CapabilityProfile,
    settings: RendererSettings,
    transforms: TransformCache,
}

impl MaskRenderer {
    pub fn new(
        compositor: Box<dyn BlurCompositor>,
        profile: CapabilityProfile,
        settings: RendererSettings,
    ) -> Self {
        Self {
            compositor,
            profile,
            settings,
            transforms: TransformCache::new(),
        }
    }

    /// Independent renderer with the same settings and a forked compositor.
    pub fn fork(&self) -> Self {
        Self::new(self.compositor.fork(), self.profile, self.settings)
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn render(
        &mut self,
        frame: &Frame,
        view: Option<(u32, u32)>,
        detection: &DetectionResult,
        override_mask: Option<&OverrideMask>,
    ) -> RenderedFrame {
        let Some((view_w, view_h)) = view.filter(|&(w, h)| w > 0 && h > 0) else {
            return RenderedFrame {
                frame: frame.clone(),
                detection_regions: Vec::new(),
                override_generation: None,
                masked: false,
            };
        };

        let transform = self.transforms.get(
            frame.width(),
            frame.height(),
            view_w,
            view_h,
            frame.facing().is_front(),
        );
        let mut output = match cover_base_layer(frame, view_w, view_h, &transform) {
            Ok(base) => base,
            Err(e) => {
                log::warn!("Base layer failed on frame {}: {e}", frame.index());
                Frame::filled(view_w, view_h, FALLBACK_FILL[0], frame.index()).with_metadata_of(frame)
            }
        };

        if !self.settings.masking_enabled {
            return RenderedFrame {
                frame: output,
                detection_regions: Vec::new(),
                override_generation: None,
                masked: false,
            };
        }

        let (mut masks, detection_regions) = self.plan_detection(detection, &transform);
        if let Some(mask) = override_mask {
            masks.extend(self.plan_override(mask));
        }
        self.apply(&mut output, &masks);

        RenderedFrame {
            frame: output,
            detection_regions,
            override_generation: override_mask.map(|m| m.generation),
            masked: true,
        }
    }

    /// Composites an override onto an already rendered display-space frame.
    pub fn paint_override(&mut self, frame: &mut Frame, mask: &OverrideMask) {
        let masks = self.plan_override(mask);
        self.apply(frame, &masks);
    }

    fn plan_detection(
        &self,
        detection: &DetectionResult,
        transform: &FrameTransform,
    ) -> (Vec<PlannedMask>, Vec<FaceRegion>) {
        let mut masks = Vec::with_capacity(detection.regions().len() + 1);
        let mut regions = Vec::with_capacity(detection.regions().len() + 1);

        for region in detection.regions() {
            // Tracked faces carried into a synthesized result keep their
            // own style.
            let method = if detection.method().is_synthesized() && region.track_id.is_some() {
                DetectionMethod::Tracked
            } else {
                detection.method()
            };
            let source = if method.is_synthesized() {
                region.clone()
            } else {
                expand_about_center(
                    region,
                    self.settings.face_expand_x,
                    self.settings.face_expand_y,
                )
            };
            let display = map_region(&source, transform);
            masks.push(self.plan_region(&display, MaskStyle::for_method(method)));
            regions.push(display);
        }

        if let Some(overflow) = detection.overflow() {
            let display = map_region(overflow, transform);
            let style = MaskStyle::for_method(DetectionMethod::Heuristic);
            masks.push(self.plan_region(&display, style));
            regions.push(display);
        }

        (masks, regions)
    }

    fn plan_override(&self, mask: &OverrideMask) -> Vec<PlannedMask> {
        let mut planned: Vec<PlannedMask> = mask
            .regions
            .iter()
            .map(|region| self.plan_region(region, override_style(region.confidence)))
            .collect();
        if let Some(band) = &mask.fallback {
            planned.push(self.plan_region(band, MaskStyle::for_method(DetectionMethod::Aggressive)));
        }
        planned
    }

    fn plan_region(&self, display: &FaceRegion, style: MaskStyle) -> PlannedMask {
        let padded = display.padded(style.padding);
        let clip = match style.shape {
            MaskShape::Ellipse => self
                .contour_clip(display, style.padding)
                .unwrap_or_else(|| ClipShape::ellipse_in(&padded)),
            MaskShape::RoundedRect { corner_radius } => {
                ClipShape::rounded_rect(&padded, corner_radius)
            }
        };
        PlannedMask {
            clip,
            radius: blur_radius_for(self.profile.blur_radius, display.confidence),
        }
    }

    /// Contour polygon joined with the padded box ellipse, so a contour can
    /// only widen the mask.
    fn contour_clip(&self, display: &FaceRegion, padding: f64) -> Option<ClipShape> {
        if !self.profile.contour_masks {
            return None;
        }
        let contour = display.contour.as_ref()?;
        let polygon = ClipShape::polygon(contour, self.profile.contour_sampling_step, padding)?;
        Some(ClipShape::Union(vec![
            ClipShape::ellipse_in(&display.padded(padding)),
            polygon,
        ]))
    }

    fn apply(&mut self, frame: &mut Frame, masks: &[PlannedMask]) {
        for mask in masks {
            if mask.clip.is_empty() {
                continue;
            }
            if let Err(e) = self.compositor.composite(frame, &mask.clip, mask.radius) {
                log::warn!("Blur compositing failed, filling region instead: {e}");
                fill_clip(frame, &mask.clip, FALLBACK_FILL);
            }
        }
    }
}

/// Override regions no longer carry their method; synthesized bands are told
/// apart by the confidence the prior assigns them.
fn override_style(confidence: f64) -> MaskStyle {
    let method = if confidence <= AGGRESSIVE_CONFIDENCE {
        DetectionMethod::Aggressive
    } else if confidence <= HEURISTIC_CONFIDENCE {
        DetectionMethod::Heuristic
    } else {
        DetectionMethod::Primary
    };
    MaskStyle::for_method(method)
}
