use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use crate::detection::domain::detection_result::DetectionMethod;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

/// The most recent masked frame, as shown to the user.
#[derive(Clone, Debug)]
pub struct RenderedSnapshot {
    /// Display-space pixels with every mask already applied.
    pub frame: Frame,
    /// Generation of the override composited into `frame`, if any.
    pub override_generation: Option<u64>,
    pub method: DetectionMethod,
    /// Display-space regions masked from live detection.
    pub regions: Vec<FaceRegion>,
}

impl RenderedSnapshot {
    /// Whether this frame already carries override `generation` (or a
    /// later one).
    pub fn carries_override(&self, generation: u64) -> bool {
        self.override_generation.is_some_and(|g| g >= generation)
    }
}

type Slot = Arc<Mutex<Option<Arc<RenderedSnapshot>>>>;

/// Creates the latest-wins slot the rendering context publishes into and
/// the capture controller reads from.
pub fn rendered_frame_slot() -> (SnapshotPublisher, SnapshotReader) {
    let slot: Slot = Arc::default();
    (
        SnapshotPublisher { slot: slot.clone() },
        SnapshotReader { slot },
    )
}

pub struct SnapshotPublisher {
    slot: Slot,
}

impl SnapshotPublisher {
    /// Replaces the latest snapshot. Returns `false` without blocking if
    /// the reader is copying it out at that moment.
    pub fn publish(&self, snapshot: RenderedSnapshot) -> bool {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        *slot = Some(Arc::new(snapshot));
        true
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub struct SnapshotReader {
    slot: Slot,
}

impl SnapshotReader {
    pub fn latest(&self) -> Option<Arc<RenderedSnapshot>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
