use std::collections::HashMap;

use crate::rendering::domain::blur_compositor::BlurCompositor;
use crate::rendering::domain::clip_shape::ClipShape;
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;

use super::gaussian::{self, BlurKernel, RoiRect};

/// CPU compositor: separable Gaussian over the clip's bounding box, written
/// back only where the clip contains the pixel centre.
///
/// Kernels are cached per radius since only a handful of radii occur in a
/// session.
#[derive(Default)]
pub struct CpuBlurCompositor {
    kernels: HashMap<u32, BlurKernel>,
    roi: Vec<u8>,
    temp: Vec<f32>,
}

impl CpuBlurCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    fn kernel(&mut self, radius: u32) -> &BlurKernel {
        self.kernels
            .entry(radius)
            .or_insert_with(|| BlurKernel::for_radius(radius))
    }
}

/// Clip bounds intersected with the frame, in whole pixels.
fn clip_rect(clip: &ClipShape, width: u32, height: u32) -> RoiRect {
    let (x0, y0, x1, y1) = clip.bounds();
    let left = x0.floor().clamp(0.0, width as f64) as usize;
    let top = y0.floor().clamp(0.0, height as f64) as usize;
    let right = x1.ceil().clamp(0.0, width as f64) as usize;
    let bottom = y1.ceil().clamp(0.0, height as f64) as usize;
    RoiRect {
        x: left,
        y: top,
        w: right.saturating_sub(left),
        h: bottom.saturating_sub(top),
    }
}

impl BlurCompositor for CpuBlurCompositor {
    fn composite(
        &mut self,
        frame: &mut Frame,
        clip: &ClipShape,
        radius: u32,
    ) -> Result<(), BoxError> {
        if frame.channels() == 0 {
            return Err("frame has no channels".into());
        }
        let rect = clip_rect(clip, frame.width(), frame.height());
        if rect.is_empty() || radius == 0 {
            return Ok(());
        }

        let fw = frame.width() as usize;
        let channels = frame.channels() as usize;

        let mut roi = std::mem::take(&mut self.roi);
        let mut temp = std::mem::take(&mut self.temp);
        gaussian::extract_roi(frame.data(), fw, channels, rect, &mut roi);
        self.kernel(radius)
            .apply(&mut roi, rect.w, rect.h, channels, &mut temp);

        let data = frame.data_mut();
        for row in 0..rect.h {
            let py = (rect.y + row) as f64 + 0.5;
            for col in 0..rect.w {
                if clip.contains((rect.x + col) as f64 + 0.5, py) {
                    let dst = ((rect.y + row) * fw + rect.x + col) * channels;
                    let src = (row * rect.w + col) * channels;
                    data[dst..dst + channels].copy_from_slice(&roi[src..src + channels]);
                }
            }
        }

        self.roi = roi;
        self.temp = temp;
        Ok(())
    }

    fn fork(&self) -> Box<dyn BlurCompositor> {
        Box::new(CpuBlurCompositor::new())
    }
}
