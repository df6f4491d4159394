use std::fmt;
use std::time::Instant;

use crate::classifier::Verdict;

use super::image_path::ImagePath;

/// Terminal filesystem result for a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Renamed,
    Deleted,
    Errored,
}

/// Where a photo is in the pipeline. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoState {
    Discovered,
    Stabilizing,
    Classifying,
    Resolved(Resolution),
}

impl PhotoState {
    fn rank(self) -> u8 {
        match self {
            PhotoState::Discovered => 0,
            PhotoState::Stabilizing => 1,
            PhotoState::Classifying => 2,
            PhotoState::Resolved(_) => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PhotoState::Resolved(_))
    }
}

/// What the action step did with a classified photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Archived in place under a timestamped name.
    Renamed { from: ImagePath, to: ImagePath },
    Deleted,
    /// Already gone before the action ran.
    Vanished,
    /// Error verdict; the file was left alone.
    Untouched,
    /// The action failed permanently or ran out of retries.
    Failed { reason: String },
}

impl Outcome {
    pub fn resolution(&self) -> Resolution {
        match self {
            Outcome::Renamed { .. } => Resolution::Renamed,
            Outcome::Deleted | Outcome::Vanished => Resolution::Deleted,
            Outcome::Untouched | Outcome::Failed { .. } => Resolution::Errored,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Renamed { to, .. } => match to.file_name() {
                Some(name) => write!(f, "archived as {}", name.to_string_lossy()),
                None => write!(f, "archived as {}", to.display()),
            },
            Outcome::Deleted => f.write_str("deleted"),
            Outcome::Vanished => f.write_str("already gone"),
            Outcome::Untouched => f.write_str("left untouched"),
            Outcome::Failed { reason } => write!(f, "action failed: {reason}"),
        }
    }
}

/// Per-path state owned by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub path: ImagePath,
    pub state: PhotoState,
    pub verdict: Option<Verdict>,
    /// Set once a renamed record is only kept around to absorb its own rename notifications.
    pub expires_at: Option<Instant>,
}

impl PhotoRecord {
    pub fn new(path: ImagePath) -> Self {
        Self {
            path,
            state: PhotoState::Discovered,
            verdict: None,
            expires_at: None,
        }
    }

    /// Move to `next` if it is not behind the current state. Returns whether the state changed.
    pub fn advance(&mut self, next: PhotoState) -> bool {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            return false;
        }
        self.state = next;
        true
    }
}
