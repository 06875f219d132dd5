//! Submit test jobs to a remote hardware farm and follow their logs to a
//! verdict.
//!
//! The [`JobController`] drives one job definition through submission,
//! scheduling, log following and retries; the log pipeline itself lives in
//! the `hwci-follower` crate.

pub mod cli;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod job;
pub mod mock;
pub mod replay;
pub mod service;

pub use cli::{run_cli, CliOutput};
pub use config::RunnerConfig;
pub use controller::JobController;
pub use diagnostics::{DiagnosticsSink, MemorySink};
pub use error::RunnerError;
pub use job::{Job, JobStatus, ResultMarker};
pub use mock::{MockCall, MockFarmService};
pub use replay::ReplayFarmService;
pub use service::{FarmJobState, FarmService, JobDetails, ResultRecord};
