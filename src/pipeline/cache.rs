//! Per-path records and the at-most-one-in-flight guarantee.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::classifier::Verdict;

use super::image_path::ImagePath;
use super::record::{Outcome, PhotoRecord, PhotoState, Resolution};

/// Records keyed by normalized path. Only the coordinator touches this.
#[derive(Debug, Default)]
pub struct ClassificationCache {
    records: HashMap<ImagePath, PhotoRecord>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `path`. Returns false when it is already in the pipeline or was just
    /// archived, in which case the candidate must be ignored.
    pub fn admit(&mut self, path: &ImagePath) -> bool {
        if let Some(existing) = self.records.get(path) {
            debug!(path = %path.display(), state = ?existing.state, "Ignoring duplicate candidate");
            return false;
        }
        self.records
            .insert(path.clone(), PhotoRecord::new(path.clone()));
        true
    }

    pub fn mark_stabilizing(&mut self, path: &ImagePath) -> bool {
        self.advance(path, PhotoState::Stabilizing)
    }

    /// Claim the classification slot for `path`. False means one is already running or done.
    pub fn begin_classification(&mut self, path: &ImagePath) -> bool {
        self.advance(path, PhotoState::Classifying)
    }

    pub fn record_verdict(&mut self, path: &ImagePath, verdict: Verdict) {
        if let Some(record) = self.records.get_mut(path) {
            record.verdict = Some(verdict);
        }
    }

    /// Apply a terminal outcome. Renamed records move to their new path, replacing anything a
    /// premature notification admitted there, and live until `now + retention`; everything else
    /// is evicted immediately.
    pub fn resolve(
        &mut self,
        path: &ImagePath,
        outcome: &Outcome,
        now: Instant,
        retention: Duration,
    ) {
        let Some(mut record) = self.records.remove(path) else {
            return;
        };
        record.advance(PhotoState::Resolved(outcome.resolution()));
        if let Outcome::Renamed { to, .. } = outcome {
            if record.state == PhotoState::Resolved(Resolution::Renamed) && !retention.is_zero() {
                record.path = to.clone();
                record.expires_at = Some(now + retention);
                self.records.insert(to.clone(), record);
            }
        }
    }

    /// True while `path` is waiting on the readiness gate.
    pub fn is_stabilizing(&self, path: &ImagePath) -> bool {
        self.records
            .get(path)
            .is_some_and(|record| record.state == PhotoState::Stabilizing)
    }

    /// Drop a record whose candidate never became ready. Resolved records are kept.
    pub fn abandon(&mut self, path: &ImagePath) {
        if self.records.get(path).is_some_and(|record| !record.state.is_terminal()) {
            self.records.remove(path);
        }
    }

    /// Remove archived records whose retention window has passed.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| record.expires_at.is_none_or(|deadline| deadline > now));
        before - self.records.len()
    }

    pub fn get(&self, path: &ImagePath) -> Option<&PhotoRecord> {
        self.records.get(path)
    }

    pub fn in_flight(&self) -> usize {
        self.records
            .values()
            .filter(|record| !record.state.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn advance(&mut self, path: &ImagePath, next: PhotoState) -> bool {
        self.records
            .get_mut(path)
            .map(|record| record.advance(next))
            .unwrap_or(false)
    }
}
