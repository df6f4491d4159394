use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Bounded retry with a fixed pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first try.
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryConfig {
    pub const fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Retry `action` while `should_retry` allows it and `cancel` is unset.
///
/// Returns the last error when attempts run out, the predicate refuses, or shutdown is requested.
pub(crate) fn retry_with_delay<T, E, F, R>(
    config: RetryConfig,
    cancel: &AtomicBool,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut(usize) -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match action(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts.max(1)
                    || !should_retry(&err)
                    || cancel.load(Ordering::Relaxed)
                {
                    return Err(err);
                }
                sleep_unless_cancelled(config.delay, cancel);
            }
        }
    }
}

/// Sleep in short slices so a shutdown request is noticed promptly.
pub(crate) fn sleep_unless_cancelled(total: Duration, cancel: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(50);
    let mut remaining = total;
    while !remaining.is_zero() && !cancel.load(Ordering::Relaxed) {
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}
