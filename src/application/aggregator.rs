//! Progress aggregation state machine
//!
//! `ProgressAggregator` owns the single mutable progress state. Every change
//! goes through [`ProgressAggregator::apply_event`] (or the `arm`/`disarm`
//! lifecycle calls); readers get copies through `current_snapshot` or a
//! `watch` receiver that is refreshed after each mutation.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::domain::{FileId, ProgressEvent, ProgressSnapshot, ProgressStatus, RunEpoch};

/// Tracing target of this module, kept out of log forwarding.
pub const LOG_TARGET: &str = module_path!();

#[derive(Debug, Default)]
struct AggregatorState {
    epoch: RunEpoch,
    armed: bool,
    percent: u8,
    /// Total as reported by the job; may be below `completed` if the job lied.
    reported_total: u64,
    in_flight: BTreeSet<FileId>,
    completed: u64,
    status: ProgressStatus,
    log_lines: Vec<String>,
}

impl AggregatorState {
    fn armed_at(epoch: RunEpoch) -> Self {
        Self {
            epoch,
            armed: true,
            ..Self::default()
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let total_file_count = if self.reported_total > 0 {
            self.reported_total.max(self.completed)
        } else {
            0
        };
        ProgressSnapshot {
            epoch: self.epoch,
            percent: self.percent,
            total_file_count,
            in_flight_files: self.in_flight.clone(),
            completed_count: self.completed,
            status: self.status,
            log_lines: self.log_lines.clone(),
        }
    }

    /// Returns whether the state changed.
    fn apply(&mut self, event: ProgressEvent) -> bool {
        match event {
            ProgressEvent::Progress(value) => {
                let Some(percent) = clamp_percent(value) else {
                    debug!(target: LOG_TARGET, value, "ignoring non-finite progress value");
                    return false;
                };
                if percent > self.percent {
                    self.percent = percent;
                    true
                } else {
                    false
                }
            }
            ProgressEvent::FileStarted(file) => {
                // Done is terminal; a straggling start must not resurrect the run.
                if self.status.is_terminal() {
                    trace!(target: LOG_TARGET, %file, "file started after completion, ignored");
                    return false;
                }
                let inserted = self.in_flight.insert(file);
                let status_changed = self.status != ProgressStatus::Running;
                self.status = ProgressStatus::Running;
                inserted || status_changed
            }
            ProgressEvent::FileFinished(file) => {
                if !self.in_flight.remove(&file) {
                    debug!(target: LOG_TARGET, %file, "file finished without a matching start");
                }
                self.completed = self.completed.saturating_add(1);
                true
            }
            ProgressEvent::FileTotal(count) => {
                if count < self.completed {
                    debug!(
                        target: LOG_TARGET,
                        count,
                        completed = self.completed,
                        "reported total below completed count, clamping display"
                    );
                }
                let changed = self.reported_total != count;
                self.reported_total = count;
                changed
            }
            ProgressEvent::Complete => {
                self.percent = 100;
                self.status = ProgressStatus::Done;
                self.in_flight.clear();
                true
            }
            ProgressEvent::Log(entry) => {
                self.log_lines.push(entry.format_line());
                true
            }
            ProgressEvent::Scanning => {
                if self.status == ProgressStatus::Idle {
                    self.status = ProgressStatus::Scanning;
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_percent(value: f64) -> Option<u8> {
    if value.is_finite() {
        Some(value.clamp(0.0, 100.0).floor() as u8)
    } else {
        None
    }
}

/// Single-writer owner of the progress state for the current run
#[derive(Debug)]
pub struct ProgressAggregator {
    state: Mutex<AggregatorState>,
    snapshots: watch::Sender<ProgressSnapshot>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(ProgressSnapshot::default());
        Self {
            state: Mutex::new(AggregatorState::default()),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &AggregatorState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Reset to a fresh Idle snapshot and make `epoch` current.
    ///
    /// Epochs never go backwards: the armed epoch is at least one past the
    /// previous one, and is returned.
    pub fn arm(&self, epoch: RunEpoch) -> RunEpoch {
        let mut state = self.lock();
        let armed = epoch.max(state.epoch.next());
        *state = AggregatorState::armed_at(armed);
        self.publish(&state);
        info!(epoch = %armed, "🎯 Progress aggregator armed");
        armed
    }

    /// Stop accepting events. In-flight files are dropped and an unfinished
    /// run falls back to Idle; a finished run keeps its Done snapshot.
    pub fn disarm(&self) {
        let mut state = self.lock();
        if !state.armed {
            return;
        }
        state.armed = false;
        state.in_flight.clear();
        if !state.status.is_terminal() {
            state.status = ProgressStatus::Idle;
        }
        self.publish(&state);
        info!(epoch = %state.epoch, status = %state.status, "Progress aggregator disarmed");
    }

    /// Apply one event tagged with the epoch it was received under.
    ///
    /// Events from another epoch, or arriving while disarmed, are dropped
    /// silently. Returns whether the event was applied.
    pub fn apply_event(&self, event: ProgressEvent, epoch: RunEpoch) -> bool {
        let mut state = self.lock();
        if !state.armed || epoch != state.epoch {
            debug!(
                target: LOG_TARGET,
                event = event.kind_label(),
                event_epoch = %epoch,
                current_epoch = %state.epoch,
                armed = state.armed,
                "discarding stale progress event"
            );
            return false;
        }
        if state.apply(event) {
            self.publish(&state);
        }
        true
    }

    pub fn current_snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    pub fn current_epoch(&self) -> RunEpoch {
        self.lock().epoch
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// Receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.subscribe()
    }
}
