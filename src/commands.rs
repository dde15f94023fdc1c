//! Tauri commands for the progress view
//!
//! The webview starts a run, reads snapshots, tears the view down and opens
//! the target folder through these commands. Live updates are pushed
//! separately on the `progress-snapshot` event.

use std::path::PathBuf;
use std::sync::Arc;
use tauri::{AppHandle, Manager, State};
use tracing::{info, warn};

use crate::application::JobController;
use crate::domain::{JobParams, ProgressSnapshot};
use crate::infrastructure::config::TrackerConfig;
use crate::infrastructure::logging::init_logging_with_config;
use crate::infrastructure::log_forwarder::LogForwardLayer;
use crate::infrastructure::simulated_job::SimulatedJobRunner;
use crate::infrastructure::tauri_bridge::{
    TauriEventChannel, TauriEventPublisher, TauriFolderOpener, spawn_snapshot_relay,
};

/// Managed state shared by the progress commands
pub struct ProgressState {
    pub controller: Arc<JobController>,
}

/// 🚀 Start a run over the chosen folders; returns the run's epoch.
#[tauri::command]
pub async fn start_processing(
    state: State<'_, ProgressState>,
    source_folder: String,
    target_folder: String,
) -> Result<u64, String> {
    let params = JobParams::new(source_folder, target_folder);
    state
        .controller
        .start(params)
        .await
        .map(|epoch| epoch.value())
        .map_err(|e| e.to_string())
}

/// 📊 Current progress snapshot
#[tauri::command]
pub fn progress_snapshot(state: State<'_, ProgressState>) -> ProgressSnapshot {
    state.controller.current_snapshot()
}

/// The progress view is going away
#[tauri::command]
pub fn teardown_progress(state: State<'_, ProgressState>) {
    state.controller.teardown();
}

/// 📂 Reveal the target folder; failures are only logged.
#[tauri::command]
pub fn open_target_folder(app: AppHandle, state: State<'_, ProgressState>, target_folder: String) {
    let opener = TauriFolderOpener::new(app);
    state
        .controller
        .open_target(&opener, &PathBuf::from(target_folder));
}

/// Register plugins, managed state and the progress commands.
///
/// Logging is initialized during setup so backend log lines can be forwarded
/// to the webview through the app handle.
pub fn attach(builder: tauri::Builder<tauri::Wry>, config: TrackerConfig) -> tauri::Builder<tauri::Wry> {
    builder
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(move |app| {
            let handle = app.handle().clone();
            let publisher = Arc::new(TauriEventPublisher::new(handle.clone()));

            let forward =
                LogForwardLayer::from_config(publisher.clone(), &config.channels, &config.logging);
            if let Err(e) = init_logging_with_config(&config.logging, Some(forward)) {
                warn!("Logging already initialized, forwarding disabled: {}", e);
            }

            let controller = Arc::new(JobController::new(
                Arc::new(TauriEventChannel::new(handle.clone())),
                Arc::new(SimulatedJobRunner::from_config(publisher, &config)),
                config.channels.bindings(),
            ));
            spawn_snapshot_relay(handle, controller.subscribe());
            app.manage(ProgressState { controller });

            info!("✅ Progress commands registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            start_processing,
            progress_snapshot,
            teardown_progress,
            open_target_folder
        ])
}
