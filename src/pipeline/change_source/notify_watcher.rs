use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher};
use tracing::{debug, warn};

use super::{CandidateSink, ChangeSource, WatchError, WatchStrategy};
use crate::pipeline::image_path::{ImagePath, is_supported_image};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Native filesystem notifications, each candidate held back for a settle delay.
pub struct NotifyWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NotifyWatcher {
    /// Subscribe to `directory`. Fails when the platform watcher cannot be created or attached.
    pub fn start(
        directory: &Path,
        settle_delay: Duration,
        sink: CandidateSink,
    ) -> Result<Self, WatchError> {
        let (event_tx, event_rx) = std::sync::mpsc::channel::<NotifyResult<Event>>();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })
        .map_err(WatchError::Init)?;
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: directory.to_path_buf(),
                source,
            })?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("defectwatch-notify".into())
            .spawn(move || run_watcher(watcher, event_rx, settle_delay, sink, thread_stop))
            .map_err(WatchError::Spawn)?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl ChangeSource for NotifyWatcher {
    fn strategy(&self) -> WatchStrategy {
        WatchStrategy::Notify
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NotifyWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_watcher(
    watcher: RecommendedWatcher,
    event_rx: Receiver<NotifyResult<Event>>,
    settle_delay: Duration,
    sink: CandidateSink,
    stop: Arc<AtomicBool>,
) {
    // Keeps the subscription alive for the life of the thread.
    let _watcher = watcher;
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    while !stop.load(Ordering::Relaxed) {
        let wait = next_wait(&pending, Instant::now());
        match event_rx.recv_timeout(wait) {
            Ok(Ok(event)) => {
                let due = Instant::now() + settle_delay;
                for path in candidate_paths(&event) {
                    debug!(path = %path.display(), kind = ?event.kind, "Change noticed");
                    pending.insert(path, due);
                }
            }
            Ok(Err(err)) => warn!(error = %err, "File watcher error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if !release_due(&mut pending, Instant::now(), &sink) {
            break;
        }
    }
}

fn next_wait(pending: &HashMap<PathBuf, Instant>, now: Instant) -> Duration {
    pending
        .values()
        .min()
        .map(|due| due.saturating_duration_since(now))
        .unwrap_or(IDLE_POLL_INTERVAL)
        .min(IDLE_POLL_INTERVAL)
}

/// Emit candidates whose settle delay elapsed, oldest first. False when the sink is closed.
fn release_due(
    pending: &mut HashMap<PathBuf, Instant>,
    now: Instant,
    sink: &CandidateSink,
) -> bool {
    let mut due: Vec<(Instant, PathBuf)> = pending
        .iter()
        .filter(|(_, deadline)| **deadline <= now)
        .map(|(path, deadline)| (*deadline, path.clone()))
        .collect();
    due.sort();
    for (_, path) in due {
        pending.remove(&path);
        if !sink.emit(ImagePath::new(path)) {
            return false;
        }
    }
    true
}

/// Image paths an event may have produced. Moves report their destination.
fn candidate_paths(event: &Event) -> Vec<PathBuf> {
    let paths: Vec<&PathBuf> = match event.kind {
        EventKind::Create(_) => event.paths.iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.iter().take(1).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.iter().skip(1).take(1).collect()
        }
        // Platforms that cannot tell the two ends of a rename apart report each separately.
        EventKind::Modify(ModifyKind::Name(_)) => {
            event.paths.iter().filter(|path| path.exists()).collect()
        }
        EventKind::Modify(_) => event.paths.iter().collect(),
        _ => Vec::new(),
    };
    paths
        .into_iter()
        .filter(|path| is_supported_image(path))
        .cloned()
        .collect()
}
