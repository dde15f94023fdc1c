//! Folder selection state behind the start button

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::{FolderPicker, JobParams};

/// The source and target folders the user has chosen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobForm {
    source_folder: Option<PathBuf>,
    target_folder: Option<PathBuf>,
}

impl JobForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the picker for a source folder. A cancelled or failed dialog keeps
    /// the previous choice. Returns whether the folder changed.
    pub async fn choose_source(&mut self, picker: &dyn FolderPicker) -> bool {
        choose(&mut self.source_folder, picker, "source").await
    }

    pub async fn choose_target(&mut self, picker: &dyn FolderPicker) -> bool {
        choose(&mut self.target_folder, picker, "target").await
    }

    pub fn set_source(&mut self, path: impl Into<PathBuf>) {
        self.source_folder = Some(path.into());
    }

    pub fn set_target(&mut self, path: impl Into<PathBuf>) {
        self.target_folder = Some(path.into());
    }

    pub fn source_folder(&self) -> Option<&Path> {
        self.source_folder.as_deref()
    }

    pub fn target_folder(&self) -> Option<&Path> {
        self.target_folder.as_deref()
    }

    /// Parameters for `JobController::start`. Unset folders come through
    /// empty and fail validation there.
    pub fn params(&self) -> JobParams {
        JobParams::new(
            self.source_folder.clone().unwrap_or_default(),
            self.target_folder.clone().unwrap_or_default(),
        )
    }
}

async fn choose(slot: &mut Option<PathBuf>, picker: &dyn FolderPicker, role: &str) -> bool {
    match picker.pick_folder().await {
        Ok(Some(path)) => {
            info!(role, folder = %path.display(), "Folder selected");
            *slot = Some(path);
            true
        }
        Ok(None) => {
            debug!(role, "Folder dialog cancelled");
            false
        }
        Err(err) => {
            warn!(role, error = %err, "Folder dialog failed, keeping previous choice");
            false
        }
    }
}
