//! Application layer module
//!
//! Orchestrates a progress run: the aggregator state machine, the
//! subscription lifecycle guard, the job controller and the folder form.

pub mod aggregator;
pub mod job_controller;
pub mod job_form;
pub mod lifecycle_guard;

pub use aggregator::ProgressAggregator;
pub use job_controller::JobController;
pub use job_form::JobForm;
pub use lifecycle_guard::{ArmReport, ChannelBinding, GuardPhase, LifecycleGuard};
