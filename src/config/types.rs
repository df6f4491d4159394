use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::classifier::Polarity;
use crate::pipeline::{PipelineSettings, ReadinessPolicy, RetryConfig};

/// Everything stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub model: ModelSettings,
}

/// Which change source a session should try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatcherPreference {
    /// Native notifications, falling back to polling if they cannot be initialized.
    #[default]
    Auto,
    /// Always poll the directory listing.
    Polling,
}

/// Pipeline tuning as it appears on disk; durations are whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Which side of the model output means "defect". Required in every file on disk.
    pub polarity: Polarity,
    #[serde(default)]
    pub watcher: WatcherPreference,
    /// Zero derives the count from available parallelism.
    #[serde(default)]
    pub worker_count: usize,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    #[serde(default = "default_readiness_delay_ms")]
    pub readiness_delay_ms: u64,
    #[serde(default = "default_action_attempts")]
    pub action_attempts: usize,
    #[serde(default = "default_action_retry_delay_ms")]
    pub action_retry_delay_ms: u64,
    #[serde(default = "default_archive_retention_ms")]
    pub archive_retention_ms: u64,
    /// Submit files already present when a session starts instead of treating them as baseline.
    #[serde(default)]
    pub process_existing: bool,
}

/// Where to find the classifier weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelSettings {
    /// JSON model file; when absent or unloadable the pipeline runs in demo mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self::from(&PipelineSettings::new(default_polarity()))
    }
}

impl PipelineSection {
    /// Convert on-disk values into runtime settings, clamping values that would stall the loop.
    pub fn to_settings(&self) -> PipelineSettings {
        PipelineSettings {
            polarity: self.polarity,
            watcher: self.watcher,
            worker_count: self.worker_count,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
            readiness: ReadinessPolicy {
                max_attempts: self.readiness_attempts.max(1),
                delay: Duration::from_millis(self.readiness_delay_ms),
            },
            action_retry: RetryConfig {
                max_attempts: self.action_attempts.max(1),
                delay: Duration::from_millis(self.action_retry_delay_ms),
            },
            archive_retention: Duration::from_millis(self.archive_retention_ms),
            process_existing: self.process_existing,
        }
    }
}

impl From<&PipelineSettings> for PipelineSection {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            polarity: settings.polarity,
            watcher: settings.watcher,
            worker_count: settings.worker_count,
            settle_delay_ms: millis(settings.settle_delay),
            poll_interval_ms: millis(settings.poll_interval),
            readiness_attempts: settings.readiness.max_attempts,
            readiness_delay_ms: millis(settings.readiness.delay),
            action_attempts: settings.action_retry.max_attempts,
            action_retry_delay_ms: millis(settings.action_retry.delay),
            archive_retention_ms: millis(settings.archive_retention),
            process_existing: settings.process_existing,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// Written into the config created on first run.
fn default_polarity() -> Polarity {
    Polarity::DefectProbability
}

fn default_settle_delay_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_readiness_attempts() -> u32 {
    15
}

fn default_readiness_delay_ms() -> u64 {
    500
}

fn default_action_attempts() -> usize {
    5
}

fn default_action_retry_delay_ms() -> u64 {
    1_000
}

fn default_archive_retention_ms() -> u64 {
    30_000
}
