use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::capture::still_image_sink::{ImageHandle, StillImageSink};
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Writes each captured still as a numbered JPEG in a directory.
///
/// Recaptures get a new file rather than overwriting, so the handle
/// returned for the final capture is the only one a caller should keep.
pub struct JpegFileSink {
    dir: PathBuf,
    prefix: String,
    quality: u8,
    written: u32,
}

impl JpegFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "capture".to_string(),
            quality: DEFAULT_JPEG_QUALITY,
            written: 0,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Clamped to 1..=100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&mut self) -> PathBuf {
        self.written += 1;
        self.dir
            .join(format!("{}_{:03}.jpg", self.prefix, self.written))
    }
}

impl StillImageSink for JpegFileSink {
    fn write(&mut self, frame: &Frame) -> Result<ImageHandle, BoxError> {
        if frame.channels() != 3 {
            return Err(format!("cannot encode a {}-channel frame as JPEG", frame.channels()).into());
        }
        std::fs::create_dir_all(&self.dir)?;

        let path = self.next_path();
        let file = BufWriter::new(File::create(&path)?);
        let mut encoder = JpegEncoder::new_with_quality(file, self.quality);
        encoder.encode(
            frame.data(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?;

        log::debug!("Wrote capture to {}", path.display());
        Ok(ImageHandle {
            location: path.to_string_lossy().into_owned(),
            width: frame.width(),
            height: frame.height(),
        })
    }
}
