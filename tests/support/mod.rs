#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use defectwatch::app_dirs::CONFIG_HOME_ENV;
use defectwatch::pipeline::{Outcome, PipelineEvent, PipelineHandle};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Points the app directory at `path` for the life of the guard.
pub struct ConfigHomeGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl ConfigHomeGuard {
    pub fn set(path: PathBuf) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let previous = std::env::var(CONFIG_HOME_ENV).ok();
        // SAFETY: tests run under a global lock to prevent concurrent env mutations.
        unsafe {
            std::env::set_var(CONFIG_HOME_ENV, path);
        }
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for ConfigHomeGuard {
    fn drop(&mut self) {
        if let Some(value) = self.previous.take() {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                std::env::set_var(CONFIG_HOME_ENV, value);
            }
        } else {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                std::env::remove_var(CONFIG_HOME_ENV);
            }
        }
    }
}

pub fn encode_image(format: ImageFormat, shade: u8) -> Vec<u8> {
    let image = RgbImage::from_fn(32, 24, |x, y| Rgb([shade, (x * 7) as u8, (y * 9) as u8]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

/// Write an image next to its final name and move it into place, like a scanner would.
pub fn drop_image(dir: &Path, name: &str, format: ImageFormat) -> PathBuf {
    let staging = dir.join(format!(".{name}.partial"));
    std::fs::write(&staging, encode_image(format, 128)).unwrap();
    let target = dir.join(name);
    std::fs::rename(&staging, &target).unwrap();
    target
}

/// Collect events until `count` photos are resolved or `timeout` passes.
pub fn collect_until_resolved(
    handle: &PipelineHandle,
    count: usize,
    timeout: Duration,
) -> Vec<PipelineEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    let mut resolved = 0usize;
    while resolved < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let Some(event) = handle.recv_event_timeout(remaining) else {
            break;
        };
        if matches!(event, PipelineEvent::Resolved { .. }) {
            resolved += 1;
        }
        events.push(event);
    }
    events
}

pub fn outcomes(events: &[PipelineEvent]) -> Vec<Outcome> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Resolved { outcome, .. } => Some(outcome.clone()),
            _ => None,
        })
        .collect()
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
