//! Farm service backed by a recorded session script.
//!
//! A replay script captures one job's scheduler states and log batches so
//! a full run can be exercised without a live farm. Scripts are YAML:
//!
//! ```yaml
//! job_id: 1234
//! device: rk3399-gru-kevin-1
//! states: [Submitted, Scheduled, Running]
//! batches:
//!   - finished: false
//!     lines:
//!       - {lvl: target, msg: "<STARTRUN> mesa-case"}
//!   - finished: true
//!     lines:
//!       - {lvl: target, msg: "hwci: mesa: pass"}
//! ```

use serde::Deserialize;

use hwci_follower::LogLine;

use crate::error::RunnerError;
use crate::service::{FarmJobState, FarmService, JobDetails, ResultRecord};

#[derive(Debug, Deserialize)]
struct ReplayScript {
    job_id: i64,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    states: Vec<String>,
    #[serde(default)]
    batches: Vec<ReplayBatch>,
    #[serde(default)]
    validate_errors: Vec<String>,
    #[serde(default)]
    results: Vec<ResultRecord>,
}

#[derive(Debug, Deserialize)]
struct ReplayBatch {
    #[serde(default)]
    finished: bool,
    #[serde(default)]
    lines: Vec<LogLine>,
}

pub struct ReplayFarmService {
    script: ReplayScript,
    next_state: usize,
    next_batch: usize,
}

impl ReplayFarmService {
    pub fn from_yaml(source: &str) -> Result<Self, RunnerError> {
        let script: ReplayScript =
            serde_yaml::from_str(source).map_err(|err| RunnerError::ParseCorruption {
                message: format!("replay script: {err}"),
            })?;
        Ok(Self {
            script,
            next_state: 0,
            next_batch: 0,
        })
    }
}

impl FarmService for ReplayFarmService {
    fn submit(&mut self, _definition: &str) -> Result<i64, RunnerError> {
        Ok(self.script.job_id)
    }

    fn get_logs(&mut self, _job_id: i64, _offset: usize) -> Result<(bool, Vec<LogLine>), RunnerError> {
        if self.next_batch >= self.script.batches.len() {
            return Ok((true, Vec::new()));
        }
        let batch = &self.script.batches[self.next_batch];
        self.next_batch += 1;
        Ok((batch.finished, batch.lines.clone()))
    }

    fn job_state(&mut self, _job_id: i64) -> Result<FarmJobState, RunnerError> {
        if self.script.states.is_empty() {
            return Ok(FarmJobState::Running);
        }
        let index = self.next_state.min(self.script.states.len() - 1);
        self.next_state += 1;
        Ok(FarmJobState::parse(&self.script.states[index]))
    }

    fn cancel(&mut self, _job_id: i64) -> Result<(), RunnerError> {
        Ok(())
    }

    fn show(&mut self, _job_id: i64) -> Result<JobDetails, RunnerError> {
        Ok(JobDetails {
            device: self.script.device.clone(),
            ..JobDetails::default()
        })
    }

    fn validate(&mut self, _definition: &str) -> Result<Vec<String>, RunnerError> {
        Ok(self.script.validate_errors.clone())
    }

    fn results(&mut self, _job_id: i64) -> Result<Vec<ResultRecord>, RunnerError> {
        Ok(self.script.results.clone())
    }
}
