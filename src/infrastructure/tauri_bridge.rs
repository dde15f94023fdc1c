//! Desktop webview adapters
//!
//! Maps the channel, publisher, picker and opener contracts onto the Tauri
//! event system and the opener/dialog plugins.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tauri::{AppHandle, Emitter, Listener, Runtime};
use tauri_plugin_dialog::DialogExt;
use tauri_plugin_opener::OpenerExt;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, trace};

use crate::domain::{
    EventChannel, EventHandler, EventPayload, EventPublisher, FolderOpener, FolderPicker,
    OpenError, PickError, ProgressSnapshot, SubscriptionError, SubscriptionHandle,
};

/// Webview event name the snapshot relay emits on
pub const SNAPSHOT_EVENT: &str = "progress-snapshot";

/// Webview payloads arrive as JSON text; anything unparsable is passed on as a string.
fn parse_payload(raw: &str) -> EventPayload {
    serde_json::from_str(raw).unwrap_or_else(|_| EventPayload::String(raw.to_string()))
}

/// Subscriptions on the application's global event bus
pub struct TauriEventChannel<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriEventChannel<R> {
    pub const fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl<R: Runtime> EventChannel for TauriEventChannel<R> {
    async fn subscribe(
        &self,
        channel: &str,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let id = self
            .app
            .listen(channel, move |event| handler(parse_payload(event.payload())));
        trace!(channel, ?id, "webview listener registered");

        let app = self.app.clone();
        Ok(SubscriptionHandle::new(channel, move || app.unlisten(id)))
    }
}

/// Publishes onto the webview event bus
pub struct TauriEventPublisher<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriEventPublisher<R> {
    pub const fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> EventPublisher for TauriEventPublisher<R> {
    fn publish(&self, channel: &str, payload: EventPayload) {
        if let Err(e) = self.app.emit(channel, payload) {
            // Debug only: warnings and errors are forwarded back through this publisher.
            debug!("Failed to emit event {}: {}", channel, e);
        }
    }
}

pub struct TauriFolderOpener<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriFolderOpener<R> {
    pub const fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> FolderOpener for TauriFolderOpener<R> {
    fn open(&self, path: &Path) -> Result<(), OpenError> {
        self.app
            .opener()
            .open_path(path.to_string_lossy(), None::<&str>)
            .map_err(|e| OpenError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

pub struct TauriFolderPicker<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriFolderPicker<R> {
    pub const fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl<R: Runtime> FolderPicker for TauriFolderPicker<R> {
    async fn pick_folder(&self) -> Result<Option<PathBuf>, PickError> {
        let (tx, rx) = oneshot::channel();
        self.app.dialog().file().pick_folder(move |folder| {
            let _ = tx.send(folder);
        });

        let picked = rx
            .await
            .map_err(|_| PickError::Dialog("dialog closed without an answer".into()))?;
        picked
            .map(|folder| {
                let shown = folder.to_string();
                folder.into_path().map_err(|_| PickError::NotAPath(shown))
            })
            .transpose()
    }
}

/// Push every snapshot change to the webview until the aggregator goes away.
pub fn spawn_snapshot_relay<R: Runtime>(
    app: AppHandle<R>,
    mut snapshots: watch::Receiver<ProgressSnapshot>,
) -> tauri::async_runtime::JoinHandle<()> {
    tauri::async_runtime::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if let Err(e) = app.emit(SNAPSHOT_EVENT, &snapshot) {
                error!("Failed to emit progress snapshot: {}", e);
            }
        }
        debug!("Snapshot relay stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payloads_parse_as_json_or_fall_back_to_text() {
        assert_eq!(parse_payload("\"a.jpg\""), json!("a.jpg"));
        assert_eq!(parse_payload("42.5"), json!(42.5));
        assert_eq!(parse_payload("a.jpg"), json!("a.jpg"));
        assert_eq!(
            parse_payload(r#"{"level":"INFO","message":"hi"}"#),
            json!({"level": "INFO", "message": "hi"})
        );
    }
}
