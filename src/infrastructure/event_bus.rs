//! In-process event bus
//!
//! Every subscription owns an unbounded queue and a listener task that
//! forwards payloads to its handler in publish order until the handle is
//! disposed or the bus is dropped. Publishing never waits and never drops an
//! event for a live subscriber.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::config::BusConfig;
use crate::domain::{
    EventChannel, EventHandler, EventPayload, EventPublisher, SubscriptionError,
    SubscriptionHandle,
};

/// Tracing target of this module, kept out of log forwarding.
pub const LOG_TARGET: &str = module_path!();

#[derive(Debug, Clone)]
struct Subscriber {
    key: Uuid,
    tx: mpsc::UnboundedSender<EventPayload>,
    /// Published but not yet handled
    backlog: Arc<AtomicUsize>,
}

type Channels = RwLock<HashMap<String, Vec<Subscriber>>>;

#[derive(Debug)]
pub struct LocalEventBus {
    backlog_warning: usize,
    subscribers: Arc<Channels>,
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::from_config(&BusConfig::default())
    }
}

impl LocalEventBus {
    /// `backlog_warning` is the queue depth at which a slow listener is reported.
    pub fn new(backlog_warning: usize) -> Self {
        Self {
            backlog_warning: backlog_warning.max(1),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.backlog_warning)
    }

    /// Subscriptions not yet disposed, across all channels.
    pub fn live_subscriptions(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

fn unregister(registry: &Weak<Channels>, channel: &str, key: Uuid) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let mut channels = registry.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(subscribers) = channels.get_mut(channel) {
        subscribers.retain(|s| s.key != key);
        if subscribers.is_empty() {
            channels.remove(channel);
        }
    }
}

#[async_trait]
impl EventChannel for LocalEventBus {
    async fn subscribe(
        &self,
        channel: &str,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        if channel.is_empty() {
            return Err(SubscriptionError::Refused {
                channel: String::new(),
                reason: "channel name is empty".into(),
            });
        }

        // Registered before we return, so nothing published after this is missed.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let key = Uuid::new_v4();
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber {
                key,
                tx,
                backlog: backlog.clone(),
            });

        let token = CancellationToken::new();
        let name = channel.to_string();
        let listener_token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = listener_token.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(payload) => {
                            backlog.fetch_sub(1, Ordering::Relaxed);
                            handler(payload);
                        }
                        None => break,
                    },
                }
            }
            trace!(target: LOG_TARGET, channel = %name, "listener stopped");
        });

        let registry = Arc::downgrade(&self.subscribers);
        let name = channel.to_string();
        debug!(target: LOG_TARGET, channel, "subscribed");
        Ok(SubscriptionHandle::new(channel, move || {
            token.cancel();
            unregister(&registry, &name, key);
        }))
    }
}

impl EventPublisher for LocalEventBus {
    fn publish(&self, channel: &str, payload: EventPayload) {
        // Sent outside the lock: a warning below may be forwarded back onto this bus.
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
            .unwrap_or_default();
        if subscribers.is_empty() {
            trace!(target: LOG_TARGET, channel, "no listeners, event dropped");
            return;
        }

        for subscriber in subscribers {
            // Counted before sending so the listener never decrements below zero.
            let queued = subscriber.backlog.fetch_add(1, Ordering::Relaxed) + 1;
            if subscriber.tx.send(payload.clone()).is_err() {
                subscriber.backlog.fetch_sub(1, Ordering::Relaxed);
                continue;
            }
            if queued == self.backlog_warning {
                warn!(target: LOG_TARGET, channel, queued, "⚠️ Listener falling behind");
            }
        }
    }
}
