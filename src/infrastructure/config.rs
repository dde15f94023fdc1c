//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate, later sources winning:
//! 1. Built-in defaults (`TrackerConfig::default()`)
//! 2. `config/default.toml` next to the working directory (optional)
//! 3. `photo-bench-progress/config.toml` in the user config directory (optional)
//! 4. An explicit file passed by the caller (optional)
//! 5. `PHOTO_BENCH__*` environment variables, e.g. `PHOTO_BENCH__BUS__CAPACITY=512`

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::application::ChannelBinding;
use crate::domain::EventKind;

pub const ENV_PREFIX: &str = "PHOTO_BENCH";
const ENV_SEPARATOR: &str = "__";
const APP_DIR_NAME: &str = "photo-bench-progress";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete tracker configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Channel name for each event kind
    pub channels: ChannelNames,

    /// In-process event bus settings
    pub bus: BusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Simulated job settings
    pub job: JobConfig,
}

/// Channel names the job emits on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    pub progress: String,
    pub file_started: String,
    pub file_finished: String,
    pub file_total: String,
    pub complete: String,
    pub log: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            progress: EventKind::Progress.default_channel().to_string(),
            file_started: EventKind::FileStarted.default_channel().to_string(),
            file_finished: EventKind::FileFinished.default_channel().to_string(),
            file_total: EventKind::FileTotal.default_channel().to_string(),
            complete: EventKind::Complete.default_channel().to_string(),
            log: EventKind::Log.default_channel().to_string(),
        }
    }
}

impl ChannelNames {
    pub fn name_for(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Progress => &self.progress,
            EventKind::FileStarted => &self.file_started,
            EventKind::FileFinished => &self.file_finished,
            EventKind::FileTotal => &self.file_total,
            EventKind::Complete => &self.complete,
            EventKind::Log => &self.log,
        }
    }

    pub fn bindings(&self) -> Vec<ChannelBinding> {
        EventKind::ALL
            .iter()
            .map(|kind| ChannelBinding::new(self.name_for(*kind), *kind))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Queued events per listener at which a backlog warning is logged.
    /// Delivery is never capped.
    pub backlog_warning: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backlog_warning: defaults::BUS_BACKLOG_WARNING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Pause between simulated processing steps in milliseconds
    pub step_delay_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: defaults::STEP_DELAY_MS,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; defaults to `logs/` next to the executable
    pub directory: Option<PathBuf>,

    /// Log file name inside the log directory
    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "tauri": "info")
    pub module_filters: HashMap<String, String>,

    /// Minimum level forwarded onto the log channel
    pub forward_level: String,

    /// Targets never forwarded onto the log channel (prefix match)
    pub forward_deny_targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            directory: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("tokio".to_string(), "info".to_string());
                filters.insert("tauri".to_string(), "info".to_string());
                filters.insert("wry".to_string(), "warn".to_string());
                filters.insert("tao".to_string(), "warn".to_string());
                filters
            },
            forward_level: defaults::FORWARD_LEVEL.to_string(),
            forward_deny_targets: vec![
                defaults::EVENT_LOOP_RUNNER_TARGET.to_string(),
                crate::application::aggregator::LOG_TARGET.to_string(),
                crate::infrastructure::event_bus::LOG_TARGET.to_string(),
            ],
        }
    }
}

impl TrackerConfig {
    /// Load every layer, with `explicit` on top of the file layers when given.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_layers(explicit, true, None)
    }

    /// Defaults, then `path` (required), then the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_layers(Some(path), false, None)
    }

    fn load_layers(
        explicit: Option<&Path>,
        discover: bool,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if discover {
            builder = builder.add_source(config::File::with_name("config/default").required(false));
            if let Some(user_file) = Self::user_config_path() {
                builder = builder.add_source(config::File::from(user_file).required(false));
            }
        }
        if let Some(path) = explicit {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        info!(
            bus_backlog_warning = config.bus.backlog_warning,
            log_level = %config.logging.level,
            "✅ Configuration loaded"
        );
        Ok(config)
    }

    /// `<user config dir>/photo-bench-progress/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
    }

    /// Setting value validation
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for kind in EventKind::ALL {
            let name = self.channels.name_for(kind);
            if name.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("channel name for {kind} must not be empty"),
                });
            }
            if let Some(bad) = name.chars().find(|c| !is_event_name_char(*c)) {
                return Err(ConfigError::Validation {
                    message: format!(
                        "channel name '{name}' contains '{bad}'; only alphanumerics, '-', '/', ':' and '_' are allowed"
                    ),
                });
            }
            if !seen.insert(name) {
                return Err(ConfigError::Validation {
                    message: format!("channel name '{name}' is used by more than one event kind"),
                });
            }
        }

        if self.bus.backlog_warning == 0 {
            return Err(ConfigError::Validation {
                message: "bus backlog_warning must be greater than 0".to_string(),
            });
        }

        if self.logging.forward_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Validation {
                message: format!(
                    "logging.forward_level '{}' is not a log level",
                    self.logging.forward_level
                ),
            });
        }

        Ok(())
    }
}

/// Characters the desktop event system accepts in event names
const fn is_event_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '/' | ':' | '_')
}

/// Default configuration values
pub mod defaults {
    pub const BUS_BACKLOG_WARNING: usize = 256;
    pub const STEP_DELAY_MS: u64 = 25;
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "photo-bench-progress.log";
    pub const LOG_MAX_FILES: u32 = 5;
    pub const FORWARD_LEVEL: &str = "info";
    /// Webview event loop chatter
    pub const EVENT_LOOP_RUNNER_TARGET: &str = "tao::platform_impl::platform::event_loop::runner";
}
