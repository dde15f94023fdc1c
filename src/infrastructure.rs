//! Infrastructure layer: configuration, logging, the in-process event bus,
//! the reference job runner and the desktop webview adapters.

pub mod config;
pub mod event_bus;
pub mod log_forwarder;
pub mod logging;
pub mod simulated_job;
#[cfg(feature = "tauri-bridge")]
pub mod tauri_bridge;

// Re-export commonly used items
pub use config::{ConfigError, TrackerConfig};
pub use event_bus::LocalEventBus;
pub use log_forwarder::LogForwardLayer;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use simulated_job::SimulatedJobRunner;
