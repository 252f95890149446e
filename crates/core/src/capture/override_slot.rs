use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use crate::shared::region::FaceRegion;

/// Regions the control context forces onto every rendered frame while a
/// capture is in progress. Display-space.
#[derive(Clone, Debug, PartialEq)]
pub struct OverrideMask {
    pub regions: Vec<FaceRegion>,
    /// Conservative band used when there were no recent detections.
    pub fallback: Option<FaceRegion>,
    /// Increases with every publish; rendered frames report the generation
    /// they applied.
    pub generation: u64,
}

impl OverrideMask {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty() && self.fallback.is_none()
    }
}

#[derive(Default)]
struct OverrideCell {
    slot: Mutex<Option<Arc<OverrideMask>>>,
    version: AtomicU64,
}

/// Creates a last-value-wins override slot.
///
/// The writer belongs to the control context and the reader to the
/// rendering context; neither half can be cloned, so each side has exactly
/// one owner.
pub fn override_channel() -> (OverrideWriter, OverrideReader) {
    let cell = Arc::new(OverrideCell::default());
    (
        OverrideWriter { cell: cell.clone() },
        OverrideReader {
            cell,
            seen: 0,
            cached: None,
        },
    )
}

pub struct OverrideWriter {
    cell: Arc<OverrideCell>,
}

impl OverrideWriter {
    /// Replaces the current override and returns it with its generation.
    pub fn publish(&self, regions: Vec<FaceRegion>, fallback: Option<FaceRegion>) -> Arc<OverrideMask> {
        let mut slot = self.cell.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.cell.version.load(Ordering::Relaxed) + 1;
        let mask = Arc::new(OverrideMask {
            regions,
            fallback,
            generation,
        });
        *slot = Some(mask.clone());
        self.cell.version.store(generation, Ordering::Release);
        mask
    }

    pub fn clear(&self) {
        let mut slot = self.cell.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            self.cell.version.fetch_add(1, Ordering::Release);
        }
    }

    pub fn is_active(&self) -> bool {
        self.cell
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

pub struct OverrideReader {
    cell: Arc<OverrideCell>,
    seen: u64,
    cached: Option<Arc<OverrideMask>>,
}

impl OverrideReader {
    /// Current override, if any. Never blocks: when the writer holds the
    /// slot the previously seen value is returned and the new one is picked
    /// up on the next call.
    pub fn current(&mut self) -> Option<Arc<OverrideMask>> {
        if self.cell.version.load(Ordering::Acquire) == self.seen {
            return self.cached.clone();
        }
        let slot = match self.cell.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return self.cached.clone(),
        };
        self.cached = slot.clone();
        self.seen = self.cell.version.load(Ordering::Acquire);
        self.cached.clone()
    }
}
