//! Domain module - progress data model and collaborator contracts
//!
//! Everything here is transport- and runtime-agnostic: snapshot value objects,
//! decoded events, the channel contract, job parameters and errors.

pub mod channel;
pub mod errors;
pub mod events;
pub mod job;
pub mod progress;

// Re-export commonly used items for convenience
pub use channel::{EventChannel, EventHandler, EventPayload, EventPublisher, SubscriptionHandle};
pub use errors::{
    ControllerError, JobStartError, OpenError, PickError, SubscriptionError, ValidationError,
};
pub use events::{DecodeError, EventKind, LogEntry, ProgressEvent};
pub use job::{FolderOpener, FolderPicker, JobCompletion, JobParams, JobRunner};
pub use progress::{FileId, ProgressSnapshot, ProgressStatus, RunEpoch};
