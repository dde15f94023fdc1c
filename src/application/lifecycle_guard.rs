//! Subscription lifecycle for one progress run
//!
//! The guard owns every [`SubscriptionHandle`] of the current run. Arming
//! spawns one setup task per channel; each task checks the run's cancellation
//! token under the same lock teardown takes, so a subscription that resolves
//! after teardown started is disposed on the spot instead of going live.

use futures::future::join_all;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::aggregator::ProgressAggregator;
use crate::domain::{
    EventChannel, EventHandler, EventKind, ProgressEvent, RunEpoch, SubscriptionError,
    SubscriptionHandle,
};

/// A channel name and the event kind it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub channel: String,
    pub kind: EventKind,
}

impl ChannelBinding {
    pub fn new(channel: impl Into<String>, kind: EventKind) -> Self {
        Self {
            channel: channel.into(),
            kind,
        }
    }

    /// One binding per event kind, on the job's default channel names.
    pub fn defaults() -> Vec<Self> {
        EventKind::ALL
            .iter()
            .map(|kind| Self::new(kind.default_channel(), *kind))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Unarmed,
    Armed(RunEpoch),
}

/// Outcome of arming the guard for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArmReport {
    pub epoch: RunEpoch,
    /// Subscriptions live at the end of setup
    pub active: usize,
    /// Subscriptions that resolved after teardown and were disposed at once
    pub abandoned: usize,
    pub failures: Vec<SubscriptionError>,
}

impl ArmReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.abandoned == 0
    }
}

enum SetupOutcome {
    Active,
    Abandoned,
    Failed(SubscriptionError),
}

struct GuardState {
    phase: GuardPhase,
    token: CancellationToken,
    handles: Vec<SubscriptionHandle>,
}

impl GuardState {
    fn new() -> Self {
        Self {
            phase: GuardPhase::Unarmed,
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Flag the run cancelled, then dispose whatever is live. Returns how many
    /// handles this call disposed.
    fn dispose_all(&mut self) -> usize {
        self.token.cancel();
        self.phase = GuardPhase::Unarmed;
        self.handles
            .drain(..)
            .filter(|handle| handle.dispose())
            .count()
    }
}

fn lock(state: &Mutex<GuardState>) -> MutexGuard<'_, GuardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Governs when the aggregator's channel subscriptions are live
pub struct LifecycleGuard {
    channel: Arc<dyn EventChannel>,
    state: Arc<Mutex<GuardState>>,
}

impl fmt::Debug for LifecycleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("LifecycleGuard")
            .field("phase", &state.phase)
            .field("active", &state.handles.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleGuard {
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self {
            channel,
            state: Arc::new(Mutex::new(GuardState::new())),
        }
    }

    /// Subscribe every binding for run `epoch`, feeding decoded events into
    /// `aggregator`. Any previous run is torn down first.
    ///
    /// Setup runs on spawned tasks, so dropping this future does not strand a
    /// half-registered subscription: a late handle either joins the live set
    /// or is disposed if teardown has begun.
    pub async fn arm(
        &self,
        epoch: RunEpoch,
        aggregator: &Arc<ProgressAggregator>,
        bindings: &[ChannelBinding],
    ) -> ArmReport {
        let token = {
            let mut state = lock(&self.state);
            let disposed = state.dispose_all();
            if disposed > 0 {
                debug!(disposed, "Disposed subscriptions of the previous run");
            }
            state.token = CancellationToken::new();
            state.phase = GuardPhase::Armed(epoch);
            state.token.clone()
        };

        let tasks: Vec<_> = bindings
            .iter()
            .map(|binding| {
                let handler = event_handler(binding.kind, epoch, Arc::downgrade(aggregator));
                tokio::spawn(establish(
                    self.channel.clone(),
                    self.state.clone(),
                    token.clone(),
                    binding.channel.clone(),
                    handler,
                ))
            })
            .collect();

        let mut report = ArmReport {
            epoch,
            ..ArmReport::default()
        };
        for (binding, joined) in bindings.iter().zip(join_all(tasks).await) {
            match joined {
                Ok(SetupOutcome::Active) => report.active += 1,
                Ok(SetupOutcome::Abandoned) => report.abandoned += 1,
                Ok(SetupOutcome::Failed(err)) => report.failures.push(err),
                Err(err) => {
                    warn!(channel = %binding.channel, error = %err, "Subscription setup task died");
                    report.failures.push(SubscriptionError::Interrupted {
                        channel: binding.channel.clone(),
                    });
                }
            }
        }

        info!(
            epoch = %epoch,
            active = report.active,
            abandoned = report.abandoned,
            failed = report.failures.len(),
            "📡 Progress subscriptions established"
        );
        report
    }

    /// Dispose every subscription of the current run. Safe to call any number
    /// of times and from several triggers; returns how many handles this call
    /// disposed.
    pub fn teardown(&self) -> usize {
        let disposed = lock(&self.state).dispose_all();
        if disposed > 0 {
            info!(disposed, "Progress subscriptions torn down");
        } else {
            trace!("Teardown found nothing to dispose");
        }
        disposed
    }

    pub fn phase(&self) -> GuardPhase {
        lock(&self.state).phase
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase(), GuardPhase::Armed(_))
    }

    pub fn active_count(&self) -> usize {
        lock(&self.state).handles.len()
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        lock(&self.state).dispose_all();
    }
}

async fn establish(
    channel: Arc<dyn EventChannel>,
    state: Arc<Mutex<GuardState>>,
    token: CancellationToken,
    name: String,
    handler: EventHandler,
) -> SetupOutcome {
    if token.is_cancelled() {
        return SetupOutcome::Abandoned;
    }

    let handle = match channel.subscribe(&name, handler).await {
        Ok(handle) => handle,
        Err(err) => {
            warn!(channel = %name, error = %err, "❌ Failed to subscribe progress channel");
            return SetupOutcome::Failed(err);
        }
    };

    let mut guarded = lock(&state);
    if token.is_cancelled() {
        handle.dispose();
        debug!(channel = %name, "Subscription resolved after teardown, disposed");
        SetupOutcome::Abandoned
    } else {
        trace!(channel = %name, id = %handle.id(), "Subscription active");
        guarded.handles.push(handle);
        SetupOutcome::Active
    }
}

/// Handler that decodes a payload and applies it under the run's epoch.
/// Holds the aggregator weakly so a stray subscription cannot keep it alive.
fn event_handler(
    kind: EventKind,
    epoch: RunEpoch,
    aggregator: Weak<ProgressAggregator>,
) -> EventHandler {
    Arc::new(move |payload| {
        let Some(aggregator) = aggregator.upgrade() else {
            trace!(%kind, "aggregator gone, dropping event");
            return;
        };
        match ProgressEvent::decode(kind, &payload) {
            Ok(event) => {
                aggregator.apply_event(event, epoch);
            }
            Err(err) => warn!(%kind, error = %err, "Dropping undecodable progress payload"),
        }
    })
}
