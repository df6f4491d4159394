//! Where candidate paths come from: native notifications or a timed directory poll.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::WatcherPreference;

use super::image_path::ImagePath;
use super::{ControlMessage, PipelineSettings};

mod notify_watcher;
mod poller;

pub use notify_watcher::NotifyWatcher;
pub use poller::Poller;

/// Failure to bring up native notifications for a directory.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to initialize file watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: std::path::PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("Failed to spawn watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Which mechanism is producing candidates for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStrategy {
    Notify,
    Polling,
}

impl fmt::Display for WatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WatchStrategy::Notify => "notify",
            WatchStrategy::Polling => "polling",
        })
    }
}

/// A running candidate producer. Dropping it also stops it.
pub trait ChangeSource: Send {
    fn strategy(&self) -> WatchStrategy;

    /// Stop producing candidates. Idempotent.
    fn stop(&mut self);
}

/// Delivers candidates to the control thread.
#[derive(Debug, Clone)]
pub struct CandidateSink {
    tx: Sender<ControlMessage>,
}

impl CandidateSink {
    pub(crate) fn new(tx: Sender<ControlMessage>) -> Self {
        Self { tx }
    }

    /// Returns false once the control thread is gone.
    pub fn emit(&self, path: ImagePath) -> bool {
        self.tx.send(ControlMessage::Candidate(path)).is_ok()
    }
}

/// Start the preferred change source, falling back to polling when notifications are unavailable.
pub(crate) fn start_change_source(
    directory: &Path,
    settings: &PipelineSettings,
    baseline: HashSet<ImagePath>,
    sink: CandidateSink,
) -> Result<Box<dyn ChangeSource>, WatchError> {
    start_change_source_with(directory, settings, baseline, sink, |dir, settle, sink| {
        NotifyWatcher::start(dir, settle, sink)
            .map(|watcher| Box::new(watcher) as Box<dyn ChangeSource>)
    })
}

fn start_change_source_with<F>(
    directory: &Path,
    settings: &PipelineSettings,
    baseline: HashSet<ImagePath>,
    sink: CandidateSink,
    start_native: F,
) -> Result<Box<dyn ChangeSource>, WatchError>
where
    F: FnOnce(&Path, Duration, CandidateSink) -> Result<Box<dyn ChangeSource>, WatchError>,
{
    if settings.watcher == WatcherPreference::Auto {
        match start_native(directory, settings.settle_delay, sink.clone()) {
            Ok(watcher) => {
                info!(directory = %directory.display(), "Watching with native notifications");
                return Ok(watcher);
            }
            Err(err) => {
                warn!(error = %err, "Native notifications unavailable; falling back to polling")
            }
        }
    }
    let poller = Poller::start(directory.to_path_buf(), settings.poll_interval, baseline, sink)?;
    info!(
        directory = %directory.display(),
        interval_ms = settings.poll_interval.as_millis(),
        "Watching by polling"
    );
    Ok(Box::new(poller))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Polarity;
    use std::sync::mpsc::{self, Receiver};
    use tempfile::tempdir;

    struct Idle;

    impl ChangeSource for Idle {
        fn strategy(&self) -> WatchStrategy {
            WatchStrategy::Notify
        }

        fn stop(&mut self) {}
    }

    fn settings(watcher: WatcherPreference) -> PipelineSettings {
        let mut settings = PipelineSettings::new(Polarity::DefectProbability);
        settings.watcher = watcher;
        settings.poll_interval = Duration::from_millis(20);
        settings
    }

    fn next_candidate(rx: &Receiver<ControlMessage>) -> Option<String> {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while let Some(wait) = deadline.checked_duration_since(std::time::Instant::now()) {
            match rx.recv_timeout(wait) {
                Ok(ControlMessage::Candidate(path)) => {
                    return Some(path.file_name()?.to_string_lossy().into_owned());
                }
                Ok(_) => {}
                Err(_) => return None,
            }
        }
        None
    }

    #[test]
    fn failed_native_start_falls_back_to_polling() {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut attempted = false;

        let mut source = start_change_source_with(
            dir.path(),
            &settings(WatcherPreference::Auto),
            HashSet::new(),
            CandidateSink::new(tx),
            |_, _, _| {
                attempted = true;
                Err(WatchError::Spawn(std::io::Error::other("inotify limit reached")))
            },
        )
        .unwrap();

        assert!(attempted);
        assert_eq!(source.strategy(), WatchStrategy::Polling);
        std::fs::write(dir.path().join("late.png"), b"x").unwrap();
        assert_eq!(next_candidate(&rx).as_deref(), Some("late.png"));
        source.stop();
    }

    #[test]
    fn working_native_watcher_is_preferred() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();
        let source = start_change_source_with(
            dir.path(),
            &settings(WatcherPreference::Auto),
            HashSet::new(),
            CandidateSink::new(tx),
            |_, _, _| Ok(Box::new(Idle) as Box<dyn ChangeSource>),
        )
        .unwrap();
        assert_eq!(source.strategy(), WatchStrategy::Notify);
    }

    #[test]
    fn polling_preference_skips_native_watcher() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut source = start_change_source_with(
            dir.path(),
            &settings(WatcherPreference::Polling),
            HashSet::new(),
            CandidateSink::new(tx),
            |_, _, _| panic!("native watcher must not be tried"),
        )
        .unwrap();
        assert_eq!(source.strategy(), WatchStrategy::Polling);
        source.stop();
    }
}
