//! Single owner of the index, the cache and the display pointer.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::classifier::Verdict;

use super::cache::ClassificationCache;
use super::events::PipelineEvent;
use super::image_path::ImagePath;
use super::path_index::PathIndex;
use super::record::Outcome;
use super::workers::{Job, JobQueue};
use super::ControlMessage;


/// The photo the presentation layer is currently showing, with the bytes already read.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedPhoto {
    pub path: ImagePath,
    pub data: Arc<[u8]>,
}

/// Applies every state transition on the control thread and dispatches the next job.
pub(crate) struct PipelineCoordinator<Q: JobQueue> {
    index: PathIndex,
    cache: ClassificationCache,
    displayed: Option<DisplayedPhoto>,
    jobs: Q,
    events: Sender<PipelineEvent>,
    archive_retention: Duration,
}

impl<Q: JobQueue> PipelineCoordinator<Q> {
    pub(crate) fn new(
        index: PathIndex,
        jobs: Q,
        events: Sender<PipelineEvent>,
        archive_retention: Duration,
    ) -> Self {
        Self {
            index,
            cache: ClassificationCache::new(),
            displayed: None,
            jobs,
            events,
            archive_retention,
        }
    }

    /// Apply one worker or change-source message. `Stop` is handled by the caller.
    pub(crate) fn handle(&mut self, message: ControlMessage, now: Instant) {
        match message {
            ControlMessage::Candidate(path) => self.on_candidate(path),
            ControlMessage::Ready { path, data } => self.on_ready(path, data),
            ControlMessage::NotReady(path) => self.on_not_ready(&path),
            ControlMessage::Classified { path, verdict } => self.on_classified(path, verdict),
            ControlMessage::Resolved { path, outcome } => self.on_resolved(path, outcome, now),
            ControlMessage::Stop => {}
        }
    }

    pub(crate) fn housekeeping(&mut self, now: Instant) {
        let evicted = self.cache.evict_expired(now);
        if evicted > 0 {
            debug!(evicted, "Evicted archived records");
        }
    }

    /// Hand back the job queue once the control loop is done.
    pub(crate) fn into_jobs(self) -> Q {
        self.jobs
    }

    fn on_candidate(&mut self, path: ImagePath) {
        if !self.cache.admit(&path) {
            return;
        }
        self.cache.mark_stabilizing(&path);
        self.jobs.submit(Job::AwaitReady(path));
    }

    fn on_ready(&mut self, path: ImagePath, data: Arc<[u8]>) {
        // The path may have been archived while its readiness check ran.
        if !self.cache.is_stabilizing(&path) {
            debug!(path = %path.display(), "Ignoring stale readiness result");
            return;
        }
        self.index.add(path.clone());
        self.displayed = Some(DisplayedPhoto {
            path: path.clone(),
            data: Arc::clone(&data),
        });
        self.emit(PipelineEvent::PhotoReady { path: path.clone() });
        if self.cache.begin_classification(&path) {
            self.jobs.submit(Job::Classify { path, data });
        }
    }

    fn on_not_ready(&mut self, path: &ImagePath) {
        // A later notification for the same path gets a fresh attempt.
        self.cache.abandon(path);
    }

    fn on_classified(&mut self, path: ImagePath, verdict: Verdict) {
        info!(path = %path.display(), %verdict, "Photo classified");
        self.cache.record_verdict(&path, verdict);
        self.emit(PipelineEvent::Verdict {
            path: path.clone(),
            verdict,
        });
        self.jobs.submit(Job::Resolve { path, verdict });
    }

    fn on_resolved(&mut self, path: ImagePath, outcome: Outcome, now: Instant) {
        match &outcome {
            Outcome::Renamed { to, .. } => {
                self.index.rename(&path, to.clone());
                let displayed = self.displayed.as_mut().filter(|shown| shown.path == path);
                if let Some(displayed) = displayed {
                    displayed.path = to.clone();
                }
            }
            Outcome::Deleted | Outcome::Vanished => {
                self.index.remove(&path);
                if self.displayed.as_ref().is_some_and(|shown| shown.path == path) {
                    self.displayed = None;
                }
            }
            Outcome::Untouched | Outcome::Failed { .. } => {}
        }
        self.cache.resolve(&path, &outcome, now, self.archive_retention);
        self.emit(PipelineEvent::Resolved { path, outcome });
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}
