//! The remembered watch folder, stored as a bare UTF-8 path in `last_folder.txt`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::app_dirs;
use crate::config::{self, ConfigError};

/// File holding the last selected folder.
pub const LAST_FOLDER_FILE_NAME: &str = "last_folder.txt";

/// Errors raised while reading or writing the remembered folder.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Preferences directory unavailable: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write preference: {0}")]
    Write(#[from] ConfigError),
}

/// Reads and writes the last-used folder.
#[derive(Debug, Clone)]
pub struct LastFolderStore {
    path: PathBuf,
}

impl LastFolderStore {
    /// Store located in the app directory.
    pub fn open_default() -> Result<Self, PreferencesError> {
        Ok(Self::at(app_dirs::app_root_dir()?.join(LAST_FOLDER_FILE_NAME)))
    }

    /// Store backed by an explicit file.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The remembered folder, if one was saved and it still exists as a directory.
    pub fn load(&self) -> Result<Option<PathBuf>, PreferencesError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PreferencesError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let folder = text.trim();
        if folder.is_empty() {
            return Ok(None);
        }
        let folder = PathBuf::from(folder);
        if !folder.is_dir() {
            tracing::info!(folder = %folder.display(), "Remembered folder no longer exists");
            return Ok(None);
        }
        Ok(Some(folder))
    }

    /// Remember `folder` for the next launch.
    pub fn save(&self, folder: &Path) -> Result<(), PreferencesError> {
        config::atomic_write(&self.path, folder.to_string_lossy().as_bytes())?;
        Ok(())
    }

    /// Forget the remembered folder.
    pub fn clear(&self) -> Result<(), PreferencesError> {
        config::atomic_write(&self.path, b"")?;
        Ok(())
    }
}
