use super::frame_transform::{compute_transform, FrameTransform};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TransformKey {
    frame_w: u32,
    frame_h: u32,
    view_w: u32,
    view_h: u32,
    mirrored: bool,
}

/// Memoises the last computed [`FrameTransform`].
///
/// Frame and view sizes rarely change within a session, so a single entry
/// is enough.
#[derive(Debug, Default)]
pub struct TransformCache {
    entry: Option<(TransformKey, FrameTransform)>,
    misses: u64,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &mut self,
        frame_w: u32,
        frame_h: u32,
        view_w: u32,
        view_h: u32,
        mirrored: bool,
    ) -> FrameTransform {
        let key = TransformKey {
            frame_w,
            frame_h,
            view_w,
            view_h,
            mirrored,
        };
        if let Some((cached_key, transform)) = self.entry {
            if cached_key == key {
                return transform;
            }
        }

        let mut transform =
            compute_transform(frame_w as f64, frame_h as f64, view_w as f64, view_h as f64);
        transform.mirrored = mirrored;
        self.entry = Some((key, transform));
        self.misses += 1;
        transform
    }

    /// Number of times the transform had to be recomputed.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}
