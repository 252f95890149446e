use crate::shared::region::{FaceRegion, DEFAULT_IOU_THRESHOLD};

/// Tracked-tier parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerSettings {
    /// Confidence lost per consecutive miss.
    pub confidence_decay: f64,
    /// Carried regions never drop below this confidence.
    pub confidence_floor: f64,
    /// Regions stop being carried once this many misses accumulate.
    pub max_misses: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            confidence_decay: 0.1,
            confidence_floor: 0.1,
            max_misses: 10,
        }
    }
}

/// Carries the last primary detections forward across detector misses.
///
/// Also stamps track ids on primary regions: a region overlapping a
/// previously seen one keeps its id, anything else gets a fresh id.
#[derive(Debug)]
pub struct FaceTracker {
    settings: TrackerSettings,
    last: Vec<FaceRegion>,
    misses: u32,
    next_id: u32,
}

impl FaceTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            last: Vec::new(),
            misses: 0,
            next_id: 1,
        }
    }

    /// Records a successful detection; returns the regions with track ids.
    pub fn observe(&mut self, regions: Vec<FaceRegion>) -> Vec<FaceRegion> {
        let mut claimed = vec![false; self.last.len()];
        let tracked: Vec<FaceRegion> = regions
            .into_iter()
            .map(|region| {
                if region.track_id.is_some() {
                    return region;
                }
                let best = self
                    .last
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !claimed[*i])
                    .map(|(i, prev)| (i, prev.iou(&region)))
                    .filter(|(_, iou)| *iou > DEFAULT_IOU_THRESHOLD)
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

                let id = match best.and_then(|(i, _)| {
                    claimed[i] = true;
                    self.last[i].track_id
                }) {
                    Some(id) => id,
                    None => {
                        let id = self.next_id;
                        self.next_id = self.next_id.wrapping_add(1).max(1);
                        id
                    }
                };
                region.with_track_id(id)
            })
            .collect();

        self.last = tracked.clone();
        self.misses = 0;
        tracked
    }

    /// Records a miss; returns the regions still carried, with decayed
    /// confidence, or nothing once `max_misses` is reached.
    pub fn miss(&mut self) -> Vec<FaceRegion> {
        self.misses = self.misses.saturating_add(1);
        if self.misses >= self.settings.max_misses {
            self.last.clear();
        }
        self.carried()
    }

    /// Regions currently carried, without advancing the miss counter.
    pub fn carried(&self) -> Vec<FaceRegion> {
        if self.misses == 0 {
            return self.last.clone();
        }
        let confidence = self.decayed_confidence();
        self.last
            .iter()
            .map(|r| r.clone().with_confidence(confidence))
            .collect()
    }

    pub fn decayed_confidence(&self) -> f64 {
        (1.0 - self.settings.confidence_decay * self.misses as f64)
            .max(self.settings.confidence_floor)
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn reset(&mut self) {
        self.last.clear();
        self.misses = 0;
        self.next_id = 1;
    }
}
