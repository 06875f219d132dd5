//! The remote farm's RPC surface, as this subsystem consumes it.
//!
//! The wire protocol itself is a collaborator and is not reimplemented
//! here; implementations adapt whatever transport the deployment uses.
//! Transport faults are retried with a fixed backoff before surfacing.

use std::time::Duration;

use serde::Deserialize;

use hwci_follower::LogLine;

use crate::error::RunnerError;

/// Scheduler state of a job on the farm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FarmJobState {
    Submitted,
    Scheduling,
    Scheduled,
    Running,
    Canceling,
    Finished,
    Other(String),
}

impl FarmJobState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Submitted" => Self::Submitted,
            "Scheduling" => Self::Scheduling,
            "Scheduled" => Self::Scheduled,
            "Running" => Self::Running,
            "Canceling" => Self::Canceling,
            "Finished" => Self::Finished,
            other => Self::Other(other.to_string()),
        }
    }

    /// Still waiting for a device; `wait_for_start` polls until this clears.
    pub fn in_queue(&self) -> bool {
        matches!(self, Self::Submitted | Self::Scheduling | Self::Scheduled)
    }
}

/// Detail record from the farm's `show` call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobDetails {
    pub device: Option<String>,
    pub state: Option<String>,
    pub submitted_at: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

/// One entry of the farm's result metadata, used for the
/// infrastructure-failure escalation path.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultRecord {
    pub suite: String,
    pub name: String,
    pub result: String,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

/// The subset of the farm scheduler RPC this subsystem drives.
pub trait FarmService {
    fn submit(&mut self, definition: &str) -> Result<i64, RunnerError>;
    /// Returns (job finished, new lines past `offset`).
    fn get_logs(&mut self, job_id: i64, offset: usize) -> Result<(bool, Vec<LogLine>), RunnerError>;
    fn job_state(&mut self, job_id: i64) -> Result<FarmJobState, RunnerError>;
    fn cancel(&mut self, job_id: i64) -> Result<(), RunnerError>;
    fn show(&mut self, job_id: i64) -> Result<JobDetails, RunnerError>;
    /// Farm-side validation; returns the farm's list of complaints, empty
    /// when the definition is acceptable.
    fn validate(&mut self, definition: &str) -> Result<Vec<String>, RunnerError>;
    fn results(&mut self, job_id: i64) -> Result<Vec<ResultRecord>, RunnerError>;
}

/// Decode the YAML log payload the transport delivers.
pub fn decode_log_payload(payload: &str) -> Result<Vec<LogLine>, RunnerError> {
    serde_yaml::from_str(payload).map_err(|err| RunnerError::ParseCorruption {
        message: err.to_string(),
    })
}

/// Run `op`, retrying retryable faults with a fixed backoff up to
/// `attempts` total tries; the last error surfaces unchanged.
pub fn call_with_retries<T>(
    attempts: usize,
    backoff: Duration,
    sleep: fn(Duration),
    mut op: impl FnMut() -> Result<T, RunnerError>,
) -> Result<T, RunnerError> {
    let attempts = attempts.max(1);
    let mut tried = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                tried += 1;
                if !err.is_retryable() || tried >= attempts {
                    return Err(err);
                }
                sleep(backoff);
            }
        }
    }
}

/// Inspect result metadata for an infrastructure- or definition-level
/// failure reported by the farm's own `lava` suite.
pub fn infrastructure_failure(records: &[ResultRecord]) -> Option<String> {
    records.iter().find_map(|record| {
        if record.suite != "lava" || record.result != "fail" {
            return None;
        }
        match record.error_type.as_deref() {
            Some("Infrastructure") | Some("Job") => Some(
                record
                    .error_msg
                    .clone()
                    .unwrap_or_else(|| format!("{} failed", record.name)),
            ),
            _ => None,
        }
    })
}
