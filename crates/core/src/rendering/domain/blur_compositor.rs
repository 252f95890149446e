use crate::shared::error::BoxError;
use crate::shared::frame::Frame;

use super::clip_shape::ClipShape;

/// Domain interface for compositing a blur restricted to a clip shape.
///
/// Implementations modify the frame in place. Pixels outside `clip` must
/// be left untouched.
pub trait BlurCompositor: Send {
    fn composite(&mut self, frame: &mut Frame, clip: &ClipShape, radius: u32)
        -> Result<(), BoxError>;

    /// An independent compositor with the same settings, for use on another
    /// thread.
    fn fork(&self) -> Box<dyn BlurCompositor>;
}

/// Last-resort mask: paints the clip with a flat colour.
pub fn fill_clip(frame: &mut Frame, clip: &ClipShape, rgb: [u8; 3]) {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let channels = frame.channels() as usize;
    let (x0, y0, x1, y1) = clip.bounds();
    let col_start = x0.floor().max(0.0) as usize;
    let row_start = y0.floor().max(0.0) as usize;
    let col_end = (x1.ceil().max(0.0) as usize).min(width);
    let row_end = (y1.ceil().max(0.0) as usize).min(height);

    let data = frame.data_mut();
    for row in row_start..row_end {
        for col in col_start..col_end {
            if clip.contains(col as f64 + 0.5, row as f64 + 0.5) {
                let offset = (row * width + col) * channels;
                for (c, value) in rgb.iter().enumerate().take(channels) {
                    data[offset + c] = *value;
                }
            }
        }
    }
}
