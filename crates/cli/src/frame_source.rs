use std::path::{Path, PathBuf};

use image::RgbImage;

use facemask_core::shared::constants::IMAGE_EXTENSIONS;
use facemask_core::shared::frame::{CameraFacing, Frame};

/// Replays still images as an endless camera feed.
///
/// Images are decoded once up front and cycled in order; each emitted frame
/// gets the next index and a timestamp spaced at the configured rate.
pub struct FrameSource {
    images: Vec<RgbImage>,
    facing: CameraFacing,
    interval_ms: f64,
    next_index: usize,
}

impl FrameSource {
    pub fn open(
        inputs: &[PathBuf],
        facing: CameraFacing,
        fps: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut paths = Vec::new();
        for input in inputs {
            collect_images(input, &mut paths)?;
        }
        if paths.is_empty() {
            return Err("No images found in the given inputs".into());
        }

        let mut images = Vec::with_capacity(paths.len());
        for path in &paths {
            let image = image::open(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            images.push(image.to_rgb8());
        }
        log::info!("Loaded {} image(s) as camera frames", images.len());

        Ok(Self {
            images,
            facing,
            interval_ms: 1000.0 / fps,
            next_index: 0,
        })
    }

    /// Dimensions of the first image.
    pub fn frame_size(&self) -> (u32, u32) {
        self.images
            .first()
            .map(|img| img.dimensions())
            .unwrap_or((0, 0))
    }

    pub fn next_frame(&mut self) -> Frame {
        let index = self.next_index;
        self.next_index += 1;
        let image = &self.images[index % self.images.len()];
        let (width, height) = image.dimensions();
        Frame::new(image.as_raw().clone(), width, height, 3, index)
            .with_facing(self.facing)
            .with_timestamp_ms((index as f64 * self.interval_ms).round() as u64)
    }
}

/// Adds `input` if it is an image, or the images directly inside it (sorted)
/// if it is a directory.
fn collect_images(input: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !input.is_dir() {
        out.push(input.to_path_buf());
        return Ok(());
    }
    let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_image(path))
        .collect();
    found.sort();
    out.extend(found);
    Ok(())
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
