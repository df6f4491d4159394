//! Commands a presentation layer issues: pick a folder, start, stop.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::config::AppSettings;
use crate::pipeline::{self, PipelineError, PipelineHandle};
use crate::preferences::{LastFolderStore, PreferencesError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No folder selected")]
    NoFolder,
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Already watching {0}")]
    AlreadyRunning(PathBuf),
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Selected folder, settings and the running pipeline, if any.
#[derive(Debug)]
pub struct Session {
    settings: AppSettings,
    store: LastFolderStore,
    folder: Option<PathBuf>,
    pipeline: Option<PipelineHandle>,
}

impl Session {
    /// Restores the remembered folder when it still exists.
    pub fn new(settings: AppSettings, store: LastFolderStore) -> Self {
        let folder = match store.load() {
            Ok(folder) => folder,
            Err(err) => {
                warn!(error = %err, "Failed to load remembered folder");
                None
            }
        };
        if let Some(folder) = &folder {
            info!(folder = %folder.display(), "Restored last folder");
        }
        Self {
            settings,
            store,
            folder,
            pipeline: None,
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn pipeline(&self) -> Option<&PipelineHandle> {
        self.pipeline.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Select and remember `folder`. A running pipeline is stopped first.
    pub fn select_folder(&mut self, folder: &Path) -> Result<(), SessionError> {
        if !folder.is_dir() {
            return Err(SessionError::NotADirectory(folder.to_path_buf()));
        }
        self.stop();
        self.store.save(folder)?;
        info!(folder = %folder.display(), "Folder selected");
        self.folder = Some(folder.to_path_buf());
        Ok(())
    }

    pub fn clear_folder(&mut self) -> Result<(), SessionError> {
        self.stop();
        self.store.clear()?;
        self.folder = None;
        Ok(())
    }

    /// Start watching the selected folder with the configured model.
    pub fn start(&mut self) -> Result<&PipelineHandle, SessionError> {
        let classifier =
            Classifier::from_settings(&self.settings.model, self.settings.pipeline.polarity);
        self.start_with(classifier)
    }

    /// Start watching the selected folder with an explicit classifier.
    pub fn start_with(&mut self, classifier: Classifier) -> Result<&PipelineHandle, SessionError> {
        if let Some(running) = &self.pipeline {
            return Err(SessionError::AlreadyRunning(running.directory().to_path_buf()));
        }
        let folder = self.folder.clone().ok_or(SessionError::NoFolder)?;
        let handle = pipeline::start(&folder, self.settings.pipeline.to_settings(), classifier)?;
        Ok(self.pipeline.insert(handle))
    }

    /// Returns false when nothing was running.
    pub fn stop(&mut self) -> bool {
        match self.pipeline.take() {
            Some(mut handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }
}
