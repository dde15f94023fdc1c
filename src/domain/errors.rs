//! Error taxonomy of the progress tracker
//!
//! None of these are fatal to the process: every failure returns the tracker
//! to Idle with a message the user can see.

use std::path::PathBuf;
use thiserror::Error;

/// Required job parameters are missing. Reported synchronously; the job never starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source folder must be selected")]
    MissingSource,

    #[error("target folder must be selected")]
    MissingTarget,
}

/// The job collaborator could not be invoked
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobStartError {
    #[error("source folder {path:?} is not a readable directory: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("job runner rejected the request: {message}")]
    Rejected { message: String },

    #[error("job runner is unavailable: {message}")]
    Unavailable { message: String },

    #[error("run {epoch} was torn down before the job launched")]
    Cancelled { epoch: u64 },
}

/// A channel failed to subscribe. Logged as a progress log line; the other
/// channels keep working.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("channel '{channel}' refused the subscription: {reason}")]
    Refused { channel: String, reason: String },

    #[error("subscription setup for '{channel}' was interrupted")]
    Interrupted { channel: String },
}

impl SubscriptionError {
    pub fn channel(&self) -> &str {
        match self {
            Self::Refused { channel, .. } | Self::Interrupted { channel } => channel,
        }
    }
}

/// Folder picker collaborator failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PickError {
    #[error("folder dialog failed: {0}")]
    Dialog(String),

    #[error("selected entry is not a local path: {0}")]
    NotAPath(String),
}

/// Folder opener collaborator failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not open {path:?}: {reason}")]
pub struct OpenError {
    pub path: PathBuf,
    pub reason: String,
}

/// Errors surfaced by `JobController::start`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    JobStart(#[from] JobStartError),
}
