//! Progress event types consumed from the job's event channels
//!
//! The job publishes one event kind per named channel. Payloads arrive as
//! transport-opaque JSON and are decoded here into [`ProgressEvent`] before
//! they reach the aggregator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use super::progress::FileId;

/// Event kind carried by one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    FileStarted,
    FileFinished,
    FileTotal,
    Complete,
    Log,
}

impl EventKind {
    pub const ALL: [Self; 6] = [
        Self::Progress,
        Self::FileStarted,
        Self::FileFinished,
        Self::FileTotal,
        Self::Complete,
        Self::Log,
    ];

    /// Channel name the photo bench job emits this kind on
    pub const fn default_channel(self) -> &'static str {
        match self {
            Self::Progress => "process-progress",
            Self::FileStarted => "process-file",
            Self::FileFinished => "process-file-done",
            Self::FileTotal => "process-file-total",
            Self::Complete => "process-complete",
            Self::Log => "rust-log",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Progress => "progress",
            Self::FileStarted => "file_started",
            Self::FileFinished => "file_finished",
            Self::FileTotal => "file_total",
            Self::Complete => "complete",
            Self::Log => "log",
        };
        f.write_str(label)
    }
}

/// Log record forwarded from the backend's tracing output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub target: String,
}

impl LogEntry {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            target: String::new(),
        }
    }

    /// Line as shown in the progress log: `[level]: message`
    pub fn format_line(&self) -> String {
        format!("[{}]: {}", self.level, self.message)
    }
}

/// A decoded event, ready for `ProgressAggregator::apply_event`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Percentage reported by the job; clamped on application.
    Progress(f64),
    FileStarted(FileId),
    FileFinished(FileId),
    FileTotal(u64),
    Complete,
    Log(LogEntry),
    /// The job was launched and is walking the source folder.
    Scanning,
}

impl ProgressEvent {
    pub fn log(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Log(LogEntry::new(level, message))
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::FileStarted(_) => "file_started",
            Self::FileFinished(_) => "file_finished",
            Self::FileTotal(_) => "file_total",
            Self::Complete => "complete",
            Self::Log(_) => "log",
            Self::Scanning => "scanning",
        }
    }

    /// Decode a channel payload into an event of the given kind.
    ///
    /// Numbers are accepted either as JSON numbers or numeric strings, since
    /// the job stringifies its counters before emitting them.
    pub fn decode(kind: EventKind, payload: &Value) -> Result<Self, DecodeError> {
        match kind {
            EventKind::Progress => decode_f64(kind, payload).map(Self::Progress),
            EventKind::FileStarted => decode_file_id(kind, payload).map(Self::FileStarted),
            EventKind::FileFinished => decode_file_id(kind, payload).map(Self::FileFinished),
            EventKind::FileTotal => decode_u64(kind, payload).map(Self::FileTotal),
            EventKind::Complete => Ok(Self::Complete),
            EventKind::Log => decode_log(payload).map(Self::Log),
        }
    }
}

/// Payload could not be turned into a progress event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{kind} payload has unexpected shape: {found}")]
    UnexpectedShape { kind: EventKind, found: String },

    #[error("{kind} payload is not a number: {raw}")]
    NotANumber { kind: EventKind, raw: String },

    #[error("{kind} payload carries an empty file name")]
    EmptyFileId { kind: EventKind },

    #[error("log payload is malformed: {reason}")]
    MalformedLog { reason: String },
}

fn unexpected(kind: EventKind, payload: &Value) -> DecodeError {
    DecodeError::UnexpectedShape {
        kind,
        found: payload.to_string(),
    }
}

fn decode_f64(kind: EventKind, payload: &Value) -> Result<f64, DecodeError> {
    match payload {
        Value::Number(n) => n.as_f64().ok_or_else(|| unexpected(kind, payload)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| DecodeError::NotANumber {
            kind,
            raw: s.clone(),
        }),
        _ => Err(unexpected(kind, payload)),
    }
}

fn decode_u64(kind: EventKind, payload: &Value) -> Result<u64, DecodeError> {
    match payload {
        Value::Number(n) => n.as_u64().ok_or_else(|| DecodeError::NotANumber {
            kind,
            raw: n.to_string(),
        }),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| DecodeError::NotANumber {
            kind,
            raw: s.clone(),
        }),
        _ => Err(unexpected(kind, payload)),
    }
}

fn decode_file_id(kind: EventKind, payload: &Value) -> Result<FileId, DecodeError> {
    match payload {
        Value::String(s) if s.is_empty() => Err(DecodeError::EmptyFileId { kind }),
        Value::String(s) => Ok(s.clone()),
        _ => Err(unexpected(kind, payload)),
    }
}

fn decode_log(payload: &Value) -> Result<LogEntry, DecodeError> {
    match payload {
        // Plain strings come from emitters without a level.
        Value::String(s) => Ok(LogEntry::new("INFO", s.clone())),
        Value::Object(_) => serde_json::from_value(payload.clone()).map_err(|e| {
            DecodeError::MalformedLog {
                reason: e.to_string(),
            }
        }),
        _ => Err(DecodeError::MalformedLog {
            reason: format!("expected object, got {payload}"),
        }),
    }
}
