//! Job start/stop orchestration
//!
//! `JobController` is the entry point of the rendering layer: it validates the
//! form parameters, arms the aggregator and its subscriptions for a new run,
//! launches the job, and exposes the resulting snapshot.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use super::aggregator::ProgressAggregator;
use super::lifecycle_guard::{ArmReport, ChannelBinding, LifecycleGuard};
use crate::domain::{
    ControllerError, EventChannel, FolderOpener, JobCompletion, JobParams, JobRunner,
    JobStartError, ProgressEvent, ProgressSnapshot, RunEpoch,
};

pub struct JobController {
    aggregator: Arc<ProgressAggregator>,
    guard: LifecycleGuard,
    runner: Arc<dyn JobRunner>,
    bindings: Vec<ChannelBinding>,
    /// Serializes `start` so two arm sequences never interleave.
    start_lock: Mutex<()>,
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("aggregator", &self.aggregator)
            .field("guard", &self.guard)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl JobController {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        runner: Arc<dyn JobRunner>,
        bindings: Vec<ChannelBinding>,
    ) -> Self {
        Self {
            aggregator: Arc::new(ProgressAggregator::new()),
            guard: LifecycleGuard::new(channel),
            runner,
            bindings,
            start_lock: Mutex::new(()),
        }
    }

    /// Validate `params`, arm a fresh run and launch the job.
    ///
    /// Returns the epoch of the new run. A validation failure leaves the
    /// tracker untouched; a launch failure leaves it disarmed and Idle with
    /// the error in the log lines. A teardown while subscriptions are still
    /// being set up cancels the start and the job is never launched.
    pub async fn start(&self, params: JobParams) -> Result<RunEpoch, ControllerError> {
        if let Err(err) = params.validate() {
            warn!(error = %err, "Rejected job start");
            return Err(err.into());
        }

        let _serial = self.start_lock.lock().await;

        let epoch = self.aggregator.arm(self.aggregator.current_epoch().next());
        let report = self.guard.arm(epoch, &self.aggregator, &self.bindings).await;
        if !self.aggregator.is_armed() || self.aggregator.current_epoch() != epoch {
            info!(epoch = %epoch, abandoned = report.abandoned, "Start cancelled by teardown");
            return Err(JobStartError::Cancelled {
                epoch: epoch.value(),
            }
            .into());
        }
        self.record_subscription_failures(&report);
        self.aggregator.apply_event(ProgressEvent::Scanning, epoch);

        info!(
            epoch = %epoch,
            source = %params.source_folder.display(),
            target = %params.target_folder.display(),
            "🚀 Launching photo bench job"
        );
        match self.runner.launch(params, epoch).await {
            Ok(completion) => {
                self.watch_completion(completion, epoch);
                Ok(epoch)
            }
            Err(err) => {
                error!(epoch = %epoch, error = %err, "❌ Job failed to start");
                self.aggregator
                    .apply_event(ProgressEvent::log("ERROR", err.to_string()), epoch);
                self.aggregator.disarm();
                self.guard.teardown();
                Err(err.into())
            }
        }
    }

    fn record_subscription_failures(&self, report: &ArmReport) {
        for failure in &report.failures {
            self.aggregator
                .apply_event(ProgressEvent::log("WARN", failure.to_string()), report.epoch);
        }
    }

    /// Route the runner's completion for `epoch` into the aggregator. A
    /// completion from a superseded run is discarded like any stale event.
    fn watch_completion(&self, completion: JobCompletion, epoch: RunEpoch) {
        let aggregator = Arc::downgrade(&self.aggregator);
        tokio::spawn(async move {
            if !completion.finished().await {
                return;
            }
            if let Some(aggregator) = aggregator.upgrade() {
                complete_run(&aggregator, epoch);
            }
        });
    }

    /// The external "job finished" signal. Forces the run to Done; the
    /// subscriptions stay live so trailing log and file-done events still land.
    pub fn on_complete(&self) {
        complete_run(&self.aggregator, self.aggregator.current_epoch());
    }

    /// View teardown. Idempotent; the aggregator stops accepting events
    /// before any subscription is disposed.
    pub fn teardown(&self) {
        self.aggregator.disarm();
        self.guard.teardown();
    }

    pub fn current_snapshot(&self) -> ProgressSnapshot {
        self.aggregator.current_snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.aggregator.subscribe()
    }

    pub const fn aggregator(&self) -> &Arc<ProgressAggregator> {
        &self.aggregator
    }

    pub const fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }

    /// Reveal the target folder. Fire-and-forget: failures are only logged.
    pub fn open_target(&self, opener: &dyn FolderOpener, target: &Path) {
        match opener.open(target) {
            Ok(()) => info!(target_folder = %target.display(), "📂 Opened target folder"),
            Err(err) => error!(error = %err, "Failed to open target folder"),
        }
    }
}

fn complete_run(aggregator: &ProgressAggregator, epoch: RunEpoch) {
    if aggregator.apply_event(ProgressEvent::Complete, epoch) {
        info!(epoch = %epoch, "✅ Job completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        EventHandler, OpenError, ProgressStatus, SubscriptionError,
        SubscriptionHandle, ValidationError,
    };
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[derive(Default)]
    struct CountingChannel {
        subscribed: AtomicUsize,
        live: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventChannel for CountingChannel {
        async fn subscribe(
            &self,
            channel: &str,
            _handler: EventHandler,
        ) -> Result<SubscriptionHandle, SubscriptionError> {
            self.subscribed.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            let live = self.live.clone();
            Ok(SubscriptionHandle::new(channel, move || {
                live.fetch_sub(1, Ordering::SeqCst);
            }))
        }
    }

    struct StubRunner {
        result: Result<(), JobStartError>,
        launches: AtomicUsize,
        finishers: StdMutex<Vec<oneshot::Sender<()>>>,
    }

    impl StubRunner {
        fn ok() -> Self {
            Self {
                result: Ok(()),
                launches: AtomicUsize::new(0),
                finishers: StdMutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                result: Err(JobStartError::Rejected {
                    message: "disk full".into(),
                }),
                ..Self::ok()
            }
        }

        /// Report the `nth` launched job as finished.
        fn finish(&self, nth: usize) {
            let finisher = std::mem::replace(
                &mut self.finishers.lock().unwrap()[nth],
                oneshot::channel().0,
            );
            finisher.send(()).unwrap();
        }
    }

    #[async_trait]
    impl JobRunner for StubRunner {
        async fn launch(
            &self,
            _params: JobParams,
            _epoch: RunEpoch,
        ) -> Result<JobCompletion, JobStartError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            self.result.clone()?;
            let (finished, completion) = JobCompletion::channel();
            self.finishers.lock().unwrap().push(finished);
            Ok(completion)
        }
    }

    fn controller(runner: StubRunner) -> (JobController, Arc<CountingChannel>, Arc<StubRunner>) {
        let channel = Arc::new(CountingChannel::default());
        let runner = Arc::new(runner);
        let ctl = JobController::new(channel.clone(), runner.clone(), ChannelBinding::defaults());
        (ctl, channel, runner)
    }

    #[tokio::test]
    async fn empty_target_is_a_validation_error() {
        let (ctl, channel, runner) = controller(StubRunner::ok());
        let err = ctl.start(JobParams::new("/photos", "")).await.unwrap_err();

        assert_eq!(err, ControllerError::Validation(ValidationError::MissingTarget));
        assert_eq!(channel.subscribed.load(Ordering::SeqCst), 0);
        assert_eq!(runner.launches.load(Ordering::SeqCst), 0);
        assert_eq!(ctl.current_snapshot(), ProgressSnapshot::default());
    }

    #[tokio::test]
    async fn start_arms_subscribes_and_scans() {
        let (ctl, channel, runner) = controller(StubRunner::ok());
        let epoch = ctl.start(JobParams::new("/photos", "/out")).await.unwrap();

        assert_eq!(epoch, RunEpoch::new(1));
        assert_eq!(channel.live.load(Ordering::SeqCst), ChannelBinding::defaults().len());
        assert_eq!(runner.launches.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.current_snapshot().status, ProgressStatus::Scanning);
        assert!(ctl.guard().is_armed());
    }

    #[tokio::test]
    async fn launch_failure_disarms_and_reports() {
        let (ctl, channel, _) = controller(StubRunner::failing());
        let err = ctl.start(JobParams::new("/photos", "/out")).await.unwrap_err();

        assert!(matches!(err, ControllerError::JobStart(_)));
        let snap = ctl.current_snapshot();
        assert_eq!(snap.status, ProgressStatus::Idle);
        assert_eq!(
            snap.log_lines,
            vec!["[ERROR]: job runner rejected the request: disk full".to_string()]
        );
        assert!(!ctl.aggregator().is_armed());
        assert_eq!(channel.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn on_complete_keeps_subscriptions_until_next_run() {
        let (ctl, channel, _) = controller(StubRunner::ok());
        let first = ctl.start(JobParams::new("/photos", "/out")).await.unwrap();
        ctl.on_complete();

        let snap = ctl.current_snapshot();
        assert_eq!(snap.status, ProgressStatus::Done);
        assert_eq!(snap.percent, 100);
        assert_eq!(channel.live.load(Ordering::SeqCst), ChannelBinding::defaults().len());

        let second = ctl.start(JobParams::new("/photos", "/out")).await.unwrap();
        assert_eq!(second, first.next());
        assert_eq!(channel.live.load(Ordering::SeqCst), ChannelBinding::defaults().len());
        assert_eq!(ctl.current_snapshot().percent, 0);
    }

    #[tokio::test]
    async fn runner_completion_marks_the_run_done() {
        let (ctl, channel, runner) = controller(StubRunner::ok());
        let mut rx = ctl.subscribe();
        ctl.start(JobParams::new("/photos", "/out")).await.unwrap();

        runner.finish(0);
        let done = timeout(Duration::from_secs(1), rx.wait_for(ProgressSnapshot::is_done))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(done.percent, 100);
        assert_eq!(channel.live.load(Ordering::SeqCst), ChannelBinding::defaults().len());
    }

    #[tokio::test]
    async fn completion_of_a_superseded_run_is_ignored() {
        let (ctl, _, runner) = controller(StubRunner::ok());
        ctl.start(JobParams::new("/photos", "/out")).await.unwrap();
        let second = ctl.start(JobParams::new("/photos", "/out")).await.unwrap();

        runner.finish(0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snap = ctl.current_snapshot();
        assert_eq!(snap.epoch, second);
        assert_eq!(snap.status, ProgressStatus::Scanning);

        runner.finish(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ctl.current_snapshot().is_done());
    }

    #[tokio::test]
    async fn teardown_twice_is_harmless() {
        let (ctl, channel, _) = controller(StubRunner::ok());
        let epoch = ctl.start(JobParams::new("/photos", "/out")).await.unwrap();
        ctl.teardown();
        let after = ctl.current_snapshot();
        ctl.teardown();

        assert_eq!(channel.live.load(Ordering::SeqCst), 0);
        assert!(!ctl.aggregator().apply_event(ProgressEvent::Progress(50.0), epoch));
        assert_eq!(ctl.current_snapshot(), after);
    }

    struct RecordingOpener {
        opened: StdMutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl FolderOpener for RecordingOpener {
        fn open(&self, path: &Path) -> Result<(), OpenError> {
            if self.fail {
                return Err(OpenError {
                    path: path.to_path_buf(),
                    reason: "no file browser".into(),
                });
            }
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn open_target_swallows_errors() {
        let (ctl, _, _) = controller(StubRunner::ok());
        let ok = RecordingOpener {
            opened: StdMutex::new(Vec::new()),
            fail: false,
        };
        ctl.open_target(&ok, Path::new("/out"));
        assert_eq!(ok.opened.lock().unwrap().as_slice(), &[PathBuf::from("/out")]);

        let failing = RecordingOpener {
            opened: StdMutex::new(Vec::new()),
            fail: true,
        };
        ctl.open_target(&failing, Path::new("/out"));
        assert!(failing.opened.lock().unwrap().is_empty());
    }
}
