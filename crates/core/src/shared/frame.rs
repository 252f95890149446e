use ndarray::{ArrayView3, ShapeError};
use serde::{Deserialize, Serialize};

/// Which camera produced a frame. Front-facing frames are shown mirrored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    pub fn is_front(self) -> bool {
        self == CameraFacing::Front
    }
}

/// A single camera frame or rendered image: contiguous RGB bytes in
/// row-major order.
///
/// Sensor frames are in detector-space; frames leaving the renderer are in
/// display-space. The pixel layout is the same for both.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    facing: CameraFacing,
    timestamp_ms: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            facing: CameraFacing::Back,
            timestamp_ms: 0,
        }
    }

    /// Solid-colour RGB frame, mostly useful for tests and placeholders.
    pub fn filled(width: u32, height: u32, value: u8, index: usize) -> Self {
        Self::new(
            vec![value; (width as usize) * (height as usize) * 3],
            width,
            height,
            3,
            index,
        )
    }

    pub fn with_facing(mut self, facing: CameraFacing) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Copies the metadata (index, facing, timestamp) of `other` onto `self`.
    pub fn with_metadata_of(mut self, other: &Frame) -> Self {
        self.index = other.index;
        self.facing = other.facing;
        self.timestamp_ms = other.timestamp_ms;
        self
    }

    /// Height x width x channels view of the pixel data. Fails when the
    /// buffer length does not match the dimensions.
    pub fn as_ndarray(&self) -> Result<ArrayView3<'_, u8>, ShapeError> {
        ArrayView3::from_shape(self.shape(), &self.data)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
