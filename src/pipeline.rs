//! Watch → stabilize → classify → act.
//!
//! [`start`] spawns one control thread that owns every piece of mutable state (path index,
//! classification cache, display pointer) and a pool of workers for the slow parts. Workers and
//! change sources never touch that state; they send [`ControlMessage`]s which the control thread
//! applies one at a time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::{Classifier, Polarity, Verdict};
use crate::config::WatcherPreference;

mod actions;
mod cache;
mod change_source;
mod coordinator;
mod events;
mod failure;
mod image_path;
mod path_index;
mod readiness;
mod record;
mod retry;
mod workers;

pub use actions::{ActionResolver, Clock, archive_file_name};
pub use cache::ClassificationCache;
pub use change_source::{
    CandidateSink, ChangeSource, NotifyWatcher, Poller, WatchError, WatchStrategy,
};
pub use coordinator::DisplayedPhoto;
pub use events::PipelineEvent;
pub use failure::FailureClass;
pub use image_path::{ImagePath, SUPPORTED_IMAGE_EXTENSIONS, is_supported_image};
pub use path_index::{PathIndex, ScanError, scan};
pub use readiness::{ReadinessPolicy, await_ready, await_ready_with};
pub use record::{Outcome, PhotoRecord, PhotoState, Resolution};
pub use retry::RetryConfig;

use coordinator::PipelineCoordinator;
use workers::{WorkerContext, WorkerPool};

/// How often the control thread wakes to evict expired records when idle.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(500);

/// Runtime tuning for one pipeline session.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Which side of the model output means "defect". Overrides the classifier's own polarity.
    pub polarity: Polarity,
    pub watcher: WatcherPreference,
    /// Zero derives the count from available parallelism.
    pub worker_count: usize,
    /// Wait between a native notification and the first readiness probe.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub readiness: ReadinessPolicy,
    pub action_retry: RetryConfig,
    /// How long an archived record absorbs notifications for its new name.
    pub archive_retention: Duration,
    pub process_existing: bool,
}

impl PipelineSettings {
    /// Defaults for everything except the polarity, which callers must choose.
    pub fn new(polarity: Polarity) -> Self {
        Self {
            polarity,
            watcher: WatcherPreference::Auto,
            worker_count: 0,
            settle_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            readiness: ReadinessPolicy::default(),
            action_retry: RetryConfig::new(5, Duration::from_secs(1)),
            archive_retention: Duration::from_secs(30),
            process_existing: false,
        }
    }
}

/// Errors that prevent a pipeline from starting.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to resolve directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("Failed to spawn pipeline thread: {0}")]
    SpawnThread(std::io::Error),
}

/// Everything delivered to the control thread.
#[derive(Debug)]
pub(crate) enum ControlMessage {
    Candidate(ImagePath),
    Ready { path: ImagePath, data: Arc<[u8]> },
    NotReady(ImagePath),
    Classified { path: ImagePath, verdict: Verdict },
    Resolved { path: ImagePath, outcome: Outcome },
    Stop,
}

/// Start watching `directory`.
///
/// Files already present form the baseline and are left alone unless
/// [`PipelineSettings::process_existing`] is set. Verdicts are read with
/// [`PipelineSettings::polarity`] whatever polarity `classifier` was built with.
pub fn start(
    directory: &Path,
    settings: PipelineSettings,
    classifier: Classifier,
) -> Result<PipelineHandle, PipelineError> {
    let directory = std::path::absolute(directory).map_err(|source| PipelineError::Directory {
        path: directory.to_path_buf(),
        source,
    })?;
    let index = PathIndex::from_scan(&directory)?;
    let baseline: HashSet<ImagePath> = index.paths().cloned().collect();
    let demo = classifier.is_demo();
    if classifier.polarity() != settings.polarity {
        warn!(
            classifier = %classifier.polarity(),
            configured = %settings.polarity,
            "Classifier polarity overridden by pipeline settings"
        );
    }
    let classifier = classifier.with_polarity(settings.polarity);

    let shutdown = Arc::new(AtomicBool::new(false));
    let (control_tx, control_rx) = mpsc::channel::<ControlMessage>();
    let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>();

    let pool = WorkerPool::spawn(
        settings.worker_count,
        WorkerContext {
            readiness: settings.readiness,
            classifier,
            resolver: ActionResolver::new(settings.action_retry),
            shutdown: Arc::clone(&shutdown),
            results: control_tx.clone(),
        },
    )?;
    let source = change_source::start_change_source(
        &directory,
        &settings,
        baseline.clone(),
        CandidateSink::new(control_tx.clone()),
    )?;
    let strategy = source.strategy();

    if settings.process_existing {
        for path in index.paths() {
            let _ = control_tx.send(ControlMessage::Candidate(path.clone()));
        }
    }

    info!(
        directory = %directory.display(),
        %strategy,
        demo,
        polarity = %settings.polarity,
        baseline = baseline.len(),
        "Pipeline started"
    );
    let _ = event_tx.send(PipelineEvent::Started {
        directory: directory.clone(),
        strategy,
        demo,
    });

    let coordinator =
        PipelineCoordinator::new(index, pool, event_tx.clone(), settings.archive_retention);
    let thread = thread::Builder::new()
        .name("defectwatch-control".into())
        .spawn(move || run_control_loop(coordinator, control_rx, source, event_tx))
        .map_err(PipelineError::SpawnThread)?;

    Ok(PipelineHandle {
        directory,
        strategy,
        control_tx,
        events: event_rx,
        shutdown,
        thread: Some(thread),
    })
}

fn run_control_loop(
    mut coordinator: PipelineCoordinator<WorkerPool>,
    control_rx: Receiver<ControlMessage>,
    mut source: Box<dyn ChangeSource>,
    events: Sender<PipelineEvent>,
) {
    let mut next_housekeeping = Instant::now() + HOUSEKEEPING_INTERVAL;
    loop {
        match control_rx.recv_timeout(HOUSEKEEPING_INTERVAL) {
            Ok(ControlMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(message) => coordinator.handle(message, Instant::now()),
            Err(RecvTimeoutError::Timeout) => {}
        }
        let now = Instant::now();
        if now >= next_housekeeping {
            coordinator.housekeeping(now);
            next_housekeeping = now + HOUSEKEEPING_INTERVAL;
        }
    }
    source.stop();
    coordinator.into_jobs().shutdown();
    info!("Pipeline stopped");
    let _ = events.send(PipelineEvent::Stopped);
}

/// Running pipeline. Dropping it stops the pipeline.
pub struct PipelineHandle {
    directory: PathBuf,
    strategy: WatchStrategy,
    control_tx: Sender<ControlMessage>,
    events: Receiver<PipelineEvent>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn strategy(&self) -> WatchStrategy {
        self.strategy
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop watching, abandon pending retries and wait for the workers to wind down.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.control_tx.send(ControlMessage::Stop);
        if thread.join().is_err() {
            warn!("Pipeline control thread panicked");
        }
    }

    pub fn try_recv_event(&self) -> Option<PipelineEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<PipelineEvent> {
        self.events.recv_timeout(timeout).ok()
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("directory", &self.directory)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
