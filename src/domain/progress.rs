//! Progress snapshot value objects
//!
//! The snapshot is the only view of progress handed to the rendering layer.
//! It is always a copy; the aggregator keeps the one mutable instance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a file reported by the job (its file name).
pub type FileId = String;

/// Monotonically increasing identifier of one job execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunEpoch(u64);

impl RunEpoch {
    /// Epoch of a tracker that has never been armed.
    pub const INITIAL: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for RunEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RunEpoch {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Coarse phase of the current run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    Idle,
    Scanning,
    Running,
    Done,
}

impl ProgressStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Running => "running",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Immutable, externally readable view of progress state.
///
/// `total_file_count` is the display value: once a total has been reported it
/// never drops below `completed_count`, even if the job under-reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub epoch: RunEpoch,
    pub percent: u8,
    pub total_file_count: u64,
    pub in_flight_files: BTreeSet<FileId>,
    pub completed_count: u64,
    pub status: ProgressStatus,
    pub log_lines: Vec<String>,
}

impl ProgressSnapshot {
    /// Fresh all-zero snapshot for the given run.
    pub fn idle(epoch: RunEpoch) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    /// Files neither finished nor in flight, as far as the display total knows.
    pub fn remaining_count(&self) -> u64 {
        self.total_file_count
            .saturating_sub(self.completed_count)
            .saturating_sub(self.in_flight_files.len() as u64)
    }
}
