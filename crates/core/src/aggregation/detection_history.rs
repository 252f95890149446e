use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::shared::region::FaceRegion;

/// One recorded frame of display-space regions.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    /// Monotonically increasing across the session, starting at 1.
    pub sequence: u64,
    pub regions: Vec<FaceRegion>,
}

/// Fixed-capacity ring of recent per-frame detections.
///
/// Written by the rendering context, read by the capture controller.
#[derive(Debug)]
pub struct DetectionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    last_sequence: u64,
}

impl DetectionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            last_sequence: 0,
        }
    }

    /// Appends a frame's regions, evicting the oldest entry when full.
    /// Returns the sequence number assigned to the entry.
    pub fn record_frame(&mut self, regions: Vec<FaceRegion>) -> u64 {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.last_sequence += 1;
        self.entries.push_back(HistoryEntry {
            sequence: self.last_sequence,
            regions,
        });
        self.last_sequence
    }

    /// Sequence of the most recent entry, 0 when nothing was ever recorded.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Entries recorded strictly after `sequence`.
    pub fn since(&self, sequence: u64) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.sequence > sequence)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// All regions of the given entries, oldest first.
pub fn flatten(entries: &[HistoryEntry]) -> Vec<FaceRegion> {
    entries
        .iter()
        .flat_map(|e| e.regions.iter().cloned())
        .collect()
}

/// History handle shared between the rendering and control contexts.
///
/// The rendering side only ever uses [`SharedHistory::try_record`] so it
/// never waits on the control side; readers copy out under the lock.
#[derive(Clone, Debug)]
pub struct SharedHistory {
    inner: Arc<Mutex<DetectionHistory>>,
}

impl SharedHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DetectionHistory::new(capacity))),
        }
    }

    /// Records without blocking. Returns `None` if a reader holds the lock;
    /// the frame is then simply not recorded.
    pub fn try_record(&self, regions: Vec<FaceRegion>) -> Option<u64> {
        match self.inner.try_lock() {
            Ok(mut history) => Some(history.record_frame(regions)),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                Some(poisoned.into_inner().record_frame(regions))
            }
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.lock().snapshot()
    }

    pub fn since(&self, sequence: u64) -> Vec<HistoryEntry> {
        self.lock().since(sequence)
    }

    pub fn last_sequence(&self) -> u64 {
        self.lock().last_sequence()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DetectionHistory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(n: usize) -> Vec<FaceRegion> {
        (0..n)
            .map(|i| FaceRegion::new(i as f64 * 10.0, 0.0, 5.0, 5.0, 1.0))
            .collect()
    }

    #[test]
    fn test_record_assigns_increasing_sequences() {
        let mut h = DetectionHistory::new(8);
        assert_eq!(h.last_sequence(), 0);
        assert_eq!(h.record_frame(regions(1)), 1);
        assert_eq!(h.record_frame(regions(2)), 2);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut h = DetectionHistory::new(8);
        for i in 0..10 {
            h.record_frame(regions(i));
        }
        let snap = h.snapshot();
        assert_eq!(snap.len(), 8);
        assert_eq!(snap[0].sequence, 3);
        assert_eq!(snap[0].regions.len(), 2);
        assert_eq!(snap[7].sequence, 10);
    }

    #[test]
    fn test_since_returns_only_newer_entries() {
        let mut h = DetectionHistory::new(8);
        h.record_frame(regions(1));
        let mark = h.record_frame(regions(1));
        h.record_frame(regions(2));
        h.record_frame(regions(3));
        let newer = h.since(mark);
        assert_eq!(newer.len(), 2);
        assert_eq!(flatten(&newer).len(), 5);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut h = DetectionHistory::new(0);
        h.record_frame(regions(1));
        h.record_frame(regions(1));
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_clear_keeps_sequence_monotonic() {
        let mut h = DetectionHistory::new(4);
        h.record_frame(regions(1));
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.record_frame(regions(1)), 2);
    }

    #[test]
    fn test_empty_frames_are_recorded() {
        let mut h = DetectionHistory::new(4);
        h.record_frame(Vec::new());
        assert_eq!(h.len(), 1);
        assert!(flatten(&h.snapshot()).is_empty());
    }

    #[test]
    fn test_shared_history_skips_when_locked() {
        let shared = SharedHistory::new(4);
        let guard = shared.inner.lock().unwrap();
        assert!(shared.try_record(regions(1)).is_none());
        drop(guard);
        assert_eq!(shared.try_record(regions(1)), Some(1));
        assert_eq!(shared.snapshot().len(), 1);
    }
}
