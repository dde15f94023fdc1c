//! End-to-end runs over the in-process bus with the simulated job
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use photo_bench_progress_lib::application::{ChannelBinding, JobController};
use photo_bench_progress_lib::domain::{
    ControllerError, JobParams, JobStartError, ProgressSnapshot, ProgressStatus, RunEpoch,
    ValidationError,
};
use photo_bench_progress_lib::infrastructure::config::ChannelNames;
use photo_bench_progress_lib::infrastructure::{LocalEventBus, SimulatedJobRunner};
use tokio::sync::watch;
use tokio::time::timeout;

fn photo_folder(photos: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..photos {
        std::fs::write(dir.path().join(format!("IMG_{i:04}.jpg")), b"").unwrap();
    }
    // Output of an earlier run, skipped by the job
    std::fs::write(dir.path().join("1.jpg"), b"").unwrap();
    dir
}

fn setup(step_delay: Duration) -> (JobController, Arc<LocalEventBus>) {
    let bus = Arc::new(LocalEventBus::new(256));
    let runner = SimulatedJobRunner::new(bus.clone(), ChannelNames::default(), step_delay);
    let controller = JobController::new(bus.clone(), Arc::new(runner), ChannelBinding::defaults());
    (controller, bus)
}

async fn wait_for(
    rx: &mut watch::Receiver<ProgressSnapshot>,
    pred: impl Fn(&ProgressSnapshot) -> bool,
) -> ProgressSnapshot {
    let snapshot = timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("aggregator dropped");
    snapshot.clone()
}

fn params(source: &Path) -> JobParams {
    JobParams::new(source, source.join("out"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simulated_run_reaches_done_with_consistent_counts() {
    let dir = photo_folder(4);
    let (controller, bus) = setup(Duration::from_millis(1));
    let mut rx = controller.subscribe();

    let epoch = controller.start(params(dir.path())).await.unwrap();
    assert_eq!(epoch, RunEpoch::new(1));
    assert_eq!(bus.live_subscriptions(), ChannelBinding::defaults().len());

    let done = wait_for(&mut rx, |s| {
        s.is_done() && s.completed_count == 4 && s.total_file_count == 4 && s.log_lines.len() == 2
    })
    .await;
    assert_eq!(done.percent, 100);
    assert!(done.in_flight_files.is_empty());
    assert_eq!(done.remaining_count(), 0);
    assert!(done.log_lines.iter().any(|l| l.starts_with("[INFO]: Found 4 new photos")));

    controller.teardown();
    assert_eq!(bus.live_subscriptions(), 0);
    assert_eq!(controller.current_snapshot().status, ProgressStatus::Done);
}

#[tokio::test]
async fn empty_target_creates_no_subscriptions() {
    let dir = photo_folder(1);
    let (controller, bus) = setup(Duration::ZERO);

    let err = controller
        .start(JobParams::new(dir.path(), ""))
        .await
        .unwrap_err();
    assert_eq!(err, ControllerError::Validation(ValidationError::MissingTarget));
    assert_eq!(bus.live_subscriptions(), 0);
    assert_eq!(controller.current_snapshot(), ProgressSnapshot::default());
}

#[tokio::test]
async fn unreadable_source_leaves_idle_with_error_line() {
    let (controller, bus) = setup(Duration::ZERO);

    let err = controller
        .start(JobParams::new("/definitely/not/a/photo/folder", "/tmp/out"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::JobStart(JobStartError::SourceUnavailable { .. })
    ));

    let snapshot = controller.current_snapshot();
    assert_eq!(snapshot.status, ProgressStatus::Idle);
    assert_eq!(snapshot.log_lines.len(), 1);
    assert!(snapshot.log_lines[0].starts_with("[ERROR]: source folder"));
    assert_eq!(bus.live_subscriptions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_mid_run_freezes_the_snapshot() {
    let dir = photo_folder(6);
    let (controller, bus) = setup(Duration::from_millis(30));
    let mut rx = controller.subscribe();

    controller.start(params(dir.path())).await.unwrap();
    wait_for(&mut rx, |s| s.status == ProgressStatus::Running).await;

    controller.teardown();
    let frozen = controller.current_snapshot();
    assert_eq!(frozen.status, ProgressStatus::Idle);
    assert!(frozen.in_flight_files.is_empty());
    assert_eq!(bus.live_subscriptions(), 0);

    // The job keeps emitting; nothing reaches the aggregator any more.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(controller.current_snapshot(), frozen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_starts_from_a_fresh_snapshot() {
    let dir = photo_folder(2);
    let (controller, bus) = setup(Duration::ZERO);
    let mut rx = controller.subscribe();

    controller.start(params(dir.path())).await.unwrap();
    wait_for(&mut rx, |s| s.is_done() && s.completed_count == 2).await;

    let second = controller.start(params(dir.path())).await.unwrap();
    assert_eq!(second, RunEpoch::new(2));
    let fresh = controller.current_snapshot();
    assert_eq!(fresh.epoch, second);
    assert!(fresh.completed_count <= 2);
    assert_eq!(bus.live_subscriptions(), ChannelBinding::defaults().len());

    let done = wait_for(&mut rx, |s| s.epoch == second && s.is_done() && s.completed_count == 2).await;
    assert_eq!(done.total_file_count, 2);
}

#[tokio::test]
async fn burst_larger_than_backlog_warning_loses_no_files() {
    let dir = photo_folder(300);
    let (controller, _bus) = setup(Duration::ZERO);
    let mut rx = controller.subscribe();

    controller.start(params(dir.path())).await.unwrap();
    let done = wait_for(&mut rx, |s| s.is_done() && s.completed_count == 300).await;
    assert_eq!(done.total_file_count, 300);
    assert!(done.in_flight_files.is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = controller.current_snapshot();
    assert_eq!(settled.completed_count, 300);
    assert_eq!(settled.total_file_count, 300);
}
