//! Job parameters and the external collaborators around a run

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;

use super::errors::{JobStartError, OpenError, PickError, ValidationError};
use super::progress::RunEpoch;

/// Folders a photo bench run works on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    pub source_folder: PathBuf,
    pub target_folder: PathBuf,
}

impl JobParams {
    pub fn new(source_folder: impl Into<PathBuf>, target_folder: impl Into<PathBuf>) -> Self {
        Self {
            source_folder: source_folder.into(),
            target_folder: target_folder.into(),
        }
    }

    /// Both folders must be non-empty. Whether they exist is the runner's call.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.source_folder) {
            return Err(ValidationError::MissingSource);
        }
        if is_blank(&self.target_folder) {
            return Err(ValidationError::MissingTarget);
        }
        Ok(())
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty()
}

/// Resolves when a launched job has finished
#[derive(Debug)]
pub struct JobCompletion(Option<oneshot::Receiver<()>>);

impl JobCompletion {
    /// The runner keeps the sender and fires it when the job ends.
    pub fn channel() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(Some(rx)))
    }

    /// For runners whose only completion signal is the `process-complete` event.
    pub const fn unreported() -> Self {
        Self(None)
    }

    /// `true` once the job reports it finished; `false` if it never will.
    pub async fn finished(self) -> bool {
        match self.0 {
            Some(rx) => rx.await.is_ok(),
            None => false,
        }
    }
}

/// Starts the backend job. Returns once the job is running; progress then
/// arrives on the event channels and the returned completion resolves when
/// the job ends.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn launch(&self, params: JobParams, epoch: RunEpoch)
    -> Result<JobCompletion, JobStartError>;
}

/// Lets the user choose a folder. `Ok(None)` means the dialog was cancelled.
#[async_trait]
pub trait FolderPicker: Send + Sync {
    async fn pick_folder(&self) -> Result<Option<PathBuf>, PickError>;
}

/// Reveals a folder in the host file browser
pub trait FolderOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<(), OpenError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "/out", Err(ValidationError::MissingSource))]
    #[case("/in", "", Err(ValidationError::MissingTarget))]
    #[case("   ", "/out", Err(ValidationError::MissingSource))]
    #[case("", "", Err(ValidationError::MissingSource))]
    #[case("/in", "/out", Ok(()))]
    fn validate_requires_both_folders(
        #[case] source: &str,
        #[case] target: &str,
        #[case] expected: Result<(), ValidationError>,
    ) {
        assert_eq!(JobParams::new(source, target).validate(), expected);
    }
}
