//! Console front-end: runs the simulated photo bench job on the in-process
//! event bus and renders progress snapshots until the run is done.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use photo_bench_progress_lib::application::JobController;
use photo_bench_progress_lib::domain::{JobParams, ProgressSnapshot};
use photo_bench_progress_lib::infrastructure::{
    LocalEventBus, LogForwardLayer, SimulatedJobRunner, TrackerConfig, init_logging_with_config,
    logging::log_system_info,
};

#[derive(Parser, Debug)]
#[command(name = "photo-bench-progress")]
#[command(about = "Track the progress of a photo bench run from the console")]
struct Cli {
    /// Folder with the photos to process
    #[arg(short, long)]
    source: PathBuf,

    /// Folder the numbered photos are written to
    #[arg(short, long)]
    target: PathBuf,

    /// Extra configuration file, layered over config/default.toml
    #[arg(short, long, env = "PHOTO_BENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Pause between simulated steps (overrides config)
    #[arg(long)]
    step_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        TrackerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(delay) = cli.step_delay_ms {
        config.job.step_delay_ms = delay;
    }

    let bus = Arc::new(LocalEventBus::from_config(&config.bus));
    let forward = LogForwardLayer::from_config(bus.clone(), &config.channels, &config.logging);
    init_logging_with_config(&config.logging, Some(forward))?;
    log_system_info(&config.logging);

    let runner = SimulatedJobRunner::from_config(bus.clone(), &config);
    let controller = JobController::new(bus.clone(), Arc::new(runner), config.channels.bindings());
    let mut updates = controller.subscribe();

    let epoch = controller
        .start(JobParams::new(cli.source, cli.target))
        .await?;
    info!(epoch = %epoch, "Run started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut shown_lines = 0;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                shown_lines = render(&snapshot, shown_lines);
                if snapshot.is_done() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                warn!("Interrupted, tearing down");
                break;
            }
        }
    }

    controller.teardown();
    info!(
        live_subscriptions = bus.live_subscriptions(),
        "Progress view closed"
    );
    Ok(())
}

/// Print the snapshot and any log lines not shown yet; returns the new count.
fn render(snapshot: &ProgressSnapshot, shown_lines: usize) -> usize {
    for line in snapshot.log_lines.iter().skip(shown_lines) {
        println!("  │ {line}");
    }
    println!(
        "[{}] {:>3}% {}/{} done, {} in flight",
        snapshot.status,
        snapshot.percent,
        snapshot.completed_count,
        snapshot.total_file_count,
        snapshot.in_flight_files.len()
    );
    snapshot.log_lines.len()
}
