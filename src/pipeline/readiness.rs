//! Decide when a freshly-reported file is fully written and safe to open.

use std::fs::OpenOptions;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::retry::sleep_unless_cancelled;

/// How long to keep probing a candidate before dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            delay: Duration::from_millis(500),
        }
    }
}

/// Wait until `path` can be opened for read and write and holds a non-empty body.
///
/// Returns the bytes read by the successful attempt, or `None` after `max_attempts` failed
/// probes. There is no pause after the final attempt.
pub fn await_ready(path: &Path, policy: ReadinessPolicy, cancel: &AtomicBool) -> Option<Vec<u8>> {
    let ready = await_ready_with(policy, cancel, |_| probe(path));
    if ready.is_none() && !cancel.load(Ordering::Relaxed) {
        warn!(
            path = %path.display(),
            attempts = policy.max_attempts,
            "File never became ready; dropping candidate"
        );
    }
    ready
}

/// Drive `probe` under `policy`. `Ok(None)` and `Err(_)` both mean "not yet".
pub fn await_ready_with<F>(
    policy: ReadinessPolicy,
    cancel: &AtomicBool,
    mut probe: F,
) -> Option<Vec<u8>>
where
    F: FnMut(u32) -> io::Result<Option<Vec<u8>>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        match probe(attempt) {
            Ok(Some(bytes)) => return Some(bytes),
            Ok(None) => debug!(attempt, "Candidate is still empty"),
            Err(err) => debug!(attempt, error = %err, "Candidate not ready"),
        }
        if attempt < attempts {
            sleep_unless_cancelled(policy.delay, cancel);
        }
    }
    None
}

fn probe(path: &Path) -> io::Result<Option<Vec<u8>>> {
    // Write access fails while another process still holds the file exclusively.
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let expected = file.metadata()?.len();
    if expected == 0 {
        return Ok(None);
    }
    let mut bytes = Vec::with_capacity(usize::try_from(expected).unwrap_or(0));
    file.read_to_end(&mut bytes)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FAST: ReadinessPolicy = ReadinessPolicy {
        max_attempts: 5,
        delay: Duration::from_millis(0),
    };

    #[test]
    fn ready_on_last_permitted_attempt() {
        let cancel = AtomicBool::new(false);
        let mut calls = 0u32;
        let result = await_ready_with(FAST, &cancel, |attempt| {
            calls += 1;
            if attempt < 5 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                Ok(Some(vec![1, 2, 3]))
            }
        });
        assert_eq!(result, Some(vec![1, 2, 3]));
        assert_eq!(calls, 5);
    }

    #[test]
    fn never_ready_gives_up_after_exactly_max_attempts() {
        let cancel = AtomicBool::new(false);
        let mut calls = 0u32;
        let result = await_ready_with(FAST, &cancel, |_| {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });
        assert_eq!(result, None);
        assert_eq!(calls, 5);
    }

    #[test]
    fn no_delay_after_final_attempt() {
        let cancel = AtomicBool::new(false);
        let policy = ReadinessPolicy {
            max_attempts: 1,
            delay: Duration::from_secs(5),
        };
        let started = std::time::Instant::now();
        assert_eq!(await_ready_with(policy, &cancel, |_| Ok(None)), None);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancelled_gate_stops_probing() {
        let cancel = AtomicBool::new(true);
        let mut calls = 0u32;
        assert_eq!(
            await_ready_with(FAST, &cancel, |_| {
                calls += 1;
                Ok(None)
            }),
            None
        );
        assert_eq!(calls, 0);
    }

    #[test]
    fn real_file_returns_contents_and_empty_file_is_not_ready() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let full = dir.path().join("full.png");
        let empty = dir.path().join("empty.png");
        std::fs::write(&full, b"pixels").unwrap();
        std::fs::write(&empty, b"").unwrap();

        assert_eq!(await_ready(&full, FAST, &cancel), Some(b"pixels".to_vec()));
        assert_eq!(await_ready(&empty, FAST, &cancel), None);
        assert_eq!(await_ready(&dir.path().join("missing.png"), FAST, &cancel), None);
    }
}
