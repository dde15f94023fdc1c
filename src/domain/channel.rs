//! Named publish/subscribe channel contract
//!
//! Subscribing is asynchronous and hands back a [`SubscriptionHandle`]; the
//! handle is the only way to stop delivery. Disposal is synchronous and
//! idempotent, and dropping a handle disposes it.

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use super::errors::SubscriptionError;

/// Transport-opaque event payload
pub type EventPayload = serde_json::Value;

/// Callback invoked once per delivered payload, in publish order per channel.
pub type EventHandler = Arc<dyn Fn(EventPayload) + Send + Sync>;

type Disposer = Box<dyn FnOnce() + Send>;

/// Token bound to exactly one live channel subscription.
pub struct SubscriptionHandle {
    id: Uuid,
    channel: String,
    disposer: Mutex<Option<Disposer>>,
}

impl SubscriptionHandle {
    /// Wrap a channel-specific unsubscribe action.
    pub fn new(channel: impl Into<String>, disposer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            disposer: Mutex::new(Some(Box::new(disposer))),
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stop delivery. Returns `true` only for the call that actually disposed;
    /// every later call is a no-op.
    pub fn dispose(&self) -> bool {
        let disposer = self
            .disposer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match disposer {
            Some(disposer) => {
                disposer();
                true
            }
            None => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Subscription side of a named event stream
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Register `handler` on `channel`. Resolves once events published after
    /// this point are guaranteed to reach the handler.
    async fn subscribe(
        &self,
        channel: &str,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, SubscriptionError>;

    fn dispose(&self, handle: &SubscriptionHandle) {
        handle.dispose();
    }
}

/// Publishing side of a named event stream. Fire-and-forget.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, channel: &str, payload: EventPayload);
}
