//! Forwards backend tracing output onto the log channel
//!
//! Each event at or above the configured level becomes a
//! `{level, message, target}` payload, the same shape the progress view
//! decodes into a log line.

use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::config::{ChannelNames, LoggingConfig};
use crate::domain::{EventPublisher, LogEntry};

pub struct LogForwardLayer {
    publisher: Arc<dyn EventPublisher>,
    channel: String,
    min_level: Level,
    deny_targets: Vec<String>,
}

impl fmt::Debug for LogForwardLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogForwardLayer")
            .field("channel", &self.channel)
            .field("min_level", &self.min_level)
            .field("deny_targets", &self.deny_targets)
            .finish_non_exhaustive()
    }
}

impl LogForwardLayer {
    pub fn new(publisher: Arc<dyn EventPublisher>, channel: impl Into<String>) -> Self {
        Self {
            publisher,
            channel: channel.into(),
            min_level: Level::INFO,
            deny_targets: Vec::new(),
        }
    }

    /// Layer set up from the logging section; an unparsable level falls back to INFO.
    pub fn from_config(
        publisher: Arc<dyn EventPublisher>,
        channels: &ChannelNames,
        logging: &LoggingConfig,
    ) -> Self {
        Self::new(publisher, channels.log.clone())
            .with_min_level(logging.forward_level.parse().unwrap_or(Level::INFO))
            .with_deny_targets(logging.forward_deny_targets.iter().cloned())
    }

    #[must_use]
    pub const fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    #[must_use]
    pub fn with_deny_targets(mut self, targets: impl IntoIterator<Item = String>) -> Self {
        self.deny_targets.extend(targets);
        self
    }

    fn is_denied(&self, target: &str) -> bool {
        self.deny_targets
            .iter()
            .any(|denied| target.starts_with(denied.as_str()))
    }
}

impl<S: Subscriber> Layer<S> for LogForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // More verbose levels compare greater.
        if *metadata.level() > self.min_level || self.is_denied(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            level: metadata.level().to_string(),
            message: visitor.finish(),
            target: metadata.target().to_string(),
        };
        if let Ok(payload) = serde_json::to_value(&entry) {
            self.publisher.publish(&self.channel, payload);
        }
    }
}

/// Collects the `message` field plus any other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventPayload;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, EventPayload)>>);

    impl EventPublisher for Recorder {
        fn publish(&self, channel: &str, payload: EventPayload) {
            self.0.lock().unwrap().push((channel.to_string(), payload));
        }
    }

    impl Recorder {
        fn entries(&self) -> Vec<LogEntry> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .map(|(_, payload)| serde_json::from_value(payload.clone()).unwrap())
                .collect()
        }
    }

    fn with_layer(layer: LogForwardLayer, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn forwards_message_level_and_target() {
        let recorder = Arc::new(Recorder::default());
        with_layer(LogForwardLayer::new(recorder.clone(), "rust-log"), || {
            tracing::warn!(target: "photo_bench::job", "renamed 3 files");
        });

        let published = recorder.0.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "rust-log");
        drop(published);

        let entries = recorder.entries();
        assert_eq!(entries[0].level, "WARN");
        assert_eq!(entries[0].message, "renamed 3 files");
        assert_eq!(entries[0].target, "photo_bench::job");
    }

    #[test]
    fn structured_fields_follow_the_message() {
        let recorder = Arc::new(Recorder::default());
        with_layer(LogForwardLayer::new(recorder.clone(), "rust-log"), || {
            tracing::info!(file = "a.jpg", step = 2, "processed");
        });

        assert_eq!(recorder.entries()[0].message, "processed file=a.jpg step=2");
    }

    #[test]
    fn below_min_level_is_not_forwarded() {
        let recorder = Arc::new(Recorder::default());
        let layer = LogForwardLayer::new(recorder.clone(), "rust-log").with_min_level(Level::WARN);
        with_layer(layer, || {
            tracing::info!("chatty");
            tracing::debug!("chattier");
            tracing::error!("boom");
        });

        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, "ERROR");
    }

    #[test]
    fn denied_targets_are_skipped_by_prefix() {
        let recorder = Arc::new(Recorder::default());
        let layer = LogForwardLayer::new(recorder.clone(), "rust-log")
            .with_deny_targets(["tao::platform_impl".to_string()]);
        with_layer(layer, || {
            tracing::info!(
                target: "tao::platform_impl::platform::event_loop::runner",
                "NewEvents emitted without explicit RedrawEventsCleared"
            );
            tracing::info!(target: "photo_bench", "kept");
        });

        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
    }

    #[test]
    fn config_deny_list_blocks_aggregator_feedback() {
        let recorder = Arc::new(Recorder::default());
        let layer = LogForwardLayer::from_config(
            recorder.clone(),
            &ChannelNames::default(),
            &LoggingConfig {
                forward_level: "debug".into(),
                ..LoggingConfig::default()
            },
        );
        with_layer(layer, || {
            tracing::debug!(
                target: crate::application::aggregator::LOG_TARGET,
                "discarding stale progress event"
            );
        });

        assert!(recorder.entries().is_empty());
    }
}
