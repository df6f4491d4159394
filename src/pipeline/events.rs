use std::path::PathBuf;

use crate::classifier::Verdict;

use super::change_source::WatchStrategy;
use super::image_path::ImagePath;
use super::record::Outcome;

/// Notifications for the presentation layer, delivered in control-thread order.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started {
        directory: PathBuf,
        strategy: WatchStrategy,
        demo: bool,
    },
    /// A candidate passed the readiness gate and is now the displayed photo.
    PhotoReady { path: ImagePath },
    Verdict { path: ImagePath, verdict: Verdict },
    Resolved { path: ImagePath, outcome: Outcome },
    Stopped,
}
