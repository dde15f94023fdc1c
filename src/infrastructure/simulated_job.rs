//! Reference job runner
//!
//! Walks the source folder and emits the same event sequence as the photo
//! bench job, without touching any image: a scan log line, the total, then
//! `process-file` / `process-progress` / `process-file-done` per photo and a
//! final `process-complete`.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::config::{ChannelNames, TrackerConfig};
use crate::domain::{
    EventPublisher, JobCompletion, JobParams, JobRunner, JobStartError, LogEntry, RunEpoch,
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct SimulatedJobRunner {
    publisher: Arc<dyn EventPublisher>,
    channels: ChannelNames,
    step_delay: Duration,
}

impl std::fmt::Debug for SimulatedJobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedJobRunner")
            .field("channels", &self.channels)
            .field("step_delay", &self.step_delay)
            .finish_non_exhaustive()
    }
}

impl SimulatedJobRunner {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        channels: ChannelNames,
        step_delay: Duration,
    ) -> Self {
        Self {
            publisher,
            channels,
            step_delay,
        }
    }

    pub fn from_config(publisher: Arc<dyn EventPublisher>, config: &TrackerConfig) -> Self {
        Self::new(
            publisher,
            config.channels.clone(),
            Duration::from_millis(config.job.step_delay_ms),
        )
    }
}

#[async_trait]
impl JobRunner for SimulatedJobRunner {
    async fn launch(
        &self,
        params: JobParams,
        epoch: RunEpoch,
    ) -> Result<JobCompletion, JobStartError> {
        let source = params.source_folder;
        let unavailable = |reason: String| JobStartError::SourceUnavailable {
            path: source.clone(),
            reason,
        };

        let metadata = fs::metadata(&source)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }
        let photos = collect_photos(&source)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        info!(epoch = %epoch, photos = photos.len(), "📷 Simulated job scanned source folder");
        let emitter = Emission {
            publisher: self.publisher.clone(),
            channels: self.channels.clone(),
            step_delay: self.step_delay,
        };
        let (finished, completion) = JobCompletion::channel();
        tokio::spawn(emitter.run(source, photos, finished));
        Ok(completion)
    }
}

struct Emission {
    publisher: Arc<dyn EventPublisher>,
    channels: ChannelNames,
    step_delay: Duration,
}

impl Emission {
    fn log(&self, level: &str, message: String) {
        let entry = LogEntry {
            level: level.to_string(),
            message,
            target: module_path!().to_string(),
        };
        if let Ok(payload) = serde_json::to_value(entry) {
            self.publisher.publish(&self.channels.log, payload);
        }
    }

    fn emit(&self, channel: &str, payload: Value) {
        self.publisher.publish(channel, payload);
    }

    async fn run(self, source: PathBuf, photos: Vec<PathBuf>, finished: oneshot::Sender<()>) {
        let total = photos.len();
        self.log(
            "INFO",
            format!("Found {total} new photos in {}", source.display()),
        );
        self.emit(&self.channels.file_total, json!(total.to_string()));

        for (done, photo) in photos.iter().enumerate() {
            let name = photo
                .file_name()
                .and_then(OsStr::to_str)
                .unwrap_or_default()
                .to_string();
            self.emit(&self.channels.file_started, json!(name));
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            // Percentage of photos finished before this one, as the job reports it.
            #[allow(clippy::cast_precision_loss)]
            let pct = done as f32 / total as f32 * 100.0;
            self.emit(&self.channels.progress, json!(pct.to_string()));
            self.emit(&self.channels.file_finished, json!(name));
            debug!(file = %name, "simulated photo done");
        }

        self.emit(&self.channels.complete, json!(""));
        self.log(
            "INFO",
            "🎉 Done! All new photos were saved per date and numbered.".to_string(),
        );
        let _ = finished.send(());
    }
}

/// Photos below `root`, sorted, skipping ones already renamed to a number.
pub async fn collect_photos(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut photos = Vec::new();
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && is_photo(&path) && !is_already_numbered(&path) {
                photos.push(path);
            }
        }
    }
    photos.sort();
    Ok(photos)
}

pub fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Output files of a previous run are named by their number only.
pub fn is_already_numbered(path: &Path) -> bool {
    path.file_stem()
        .and_then(OsStr::to_str)
        .is_some_and(|stem| stem.parse::<usize>().is_ok())
}
