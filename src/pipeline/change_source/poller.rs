use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::{CandidateSink, ChangeSource, WatchError, WatchStrategy};
use crate::pipeline::image_path::ImagePath;
use crate::pipeline::path_index::scan;

/// Lists the directory on a fixed interval and reports paths not seen before.
pub struct Poller {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Poller {
    /// `known` is the baseline: paths in it are never reported unless they disappear and return.
    pub fn start(
        directory: PathBuf,
        interval: Duration,
        known: HashSet<ImagePath>,
        sink: CandidateSink,
    ) -> Result<Self, WatchError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("defectwatch-poller".into())
            .spawn(move || {
                let mut known = known;
                // Sleeps between scans; any message or a dropped sender ends the loop.
                while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                    if !poll_once(&directory, &mut known, &sink) {
                        break;
                    }
                }
            })
            .map_err(WatchError::Spawn)?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl ChangeSource for Poller {
    fn strategy(&self) -> WatchStrategy {
        WatchStrategy::Polling
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One scan: report `current \ known`, then replace `known` with `current`.
///
/// `known` is only updated after every new path was handed to the sink. Returns false when the
/// sink is closed.
pub(crate) fn poll_once(
    directory: &Path,
    known: &mut HashSet<ImagePath>,
    sink: &CandidateSink,
) -> bool {
    let current = match scan(directory) {
        Ok(paths) => paths,
        Err(err) => {
            warn!(error = %err, "Directory poll failed");
            return true;
        }
    };
    for path in current.iter().filter(|path| !known.contains(*path)) {
        debug!(path = %path.display(), "New file found by poll");
        if !sink.emit(path.clone()) {
            return false;
        }
    }
    *known = current.into_iter().collect();
    true
}
