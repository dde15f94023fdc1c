//! Photo Bench progress tracker
//!
//! Aggregates the progress events of a long-running photo processing job
//! into a consistent snapshot for the desktop front-end. Events from an
//! earlier run are discarded by epoch, and subscriptions are torn down
//! deterministically when the view goes away.

pub mod application;
pub mod domain;
pub mod infrastructure;
#[cfg(feature = "tauri-bridge")]
pub mod commands;

pub use application::{JobController, JobForm, ProgressAggregator};
pub use domain::{ProgressEvent, ProgressSnapshot, ProgressStatus, RunEpoch};
