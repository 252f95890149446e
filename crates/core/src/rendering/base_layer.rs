use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::geometry::frame_transform::FrameTransform;
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;

/// Scales a sensor frame to cover a `view_w` x `view_h` view with the same
/// transform the masks are mapped through, flipping it for front capture.
pub fn cover_base_layer(
    frame: &Frame,
    view_w: u32,
    view_h: u32,
    transform: &FrameTransform,
) -> Result<Frame, BoxError> {
    if frame.channels() != 3 {
        return Err(format!("expected an RGB frame, got {} channels", frame.channels()).into());
    }
    if transform.is_degenerate() || view_w == 0 || view_h == 0 {
        return Err("cannot cover an empty view".into());
    }

    let source = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or("frame buffer does not match its dimensions")?;

    let scaled_w = ((frame.width() as f64 * transform.scale).round() as u32).max(view_w);
    let scaled_h = ((frame.height() as f64 * transform.scale).round() as u32).max(view_h);
    let mut scaled = if (scaled_w, scaled_h) == source.dimensions() {
        source
    } else {
        imageops::resize(&source, scaled_w, scaled_h, FilterType::Triangle)
    };
    if transform.mirrored {
        imageops::flip_horizontal_in_place(&mut scaled);
    }

    let crop_x = ((-transform.offset_x).round().max(0.0) as u32).min(scaled_w - view_w);
    let crop_y = ((-transform.offset_y).round().max(0.0) as u32).min(scaled_h - view_h);
    let view = imageops::crop_imm(&scaled, crop_x, crop_y, view_w, view_h).to_image();

    Ok(Frame::new(view.into_raw(), view_w, view_h, 3, frame.index()).with_metadata_of(frame))
}
