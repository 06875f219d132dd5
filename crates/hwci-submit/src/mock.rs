//! Scripted farm service for testing.
//!
//! Records every call and replays pre-configured responses: submit
//! outcomes, a scheduler-state sequence, per-poll log batches, and result
//! metadata.

use hwci_follower::LogLine;

use crate::error::RunnerError;
use crate::service::{FarmJobState, FarmService, JobDetails, ResultRecord};

/// A recorded call to the mock service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Submit,
    GetLogs { job_id: i64, offset: usize },
    JobState { job_id: i64 },
    Cancel { job_id: i64 },
    Show { job_id: i64 },
    Validate,
    Results { job_id: i64 },
}

#[derive(Default)]
pub struct MockFarmService {
    submit_script: Vec<Result<i64, RunnerError>>,
    state_script: Vec<FarmJobState>,
    log_script: Vec<Result<(bool, Vec<LogLine>), RunnerError>>,
    validate_errors: Vec<String>,
    result_records: Vec<ResultRecord>,
    details: JobDetails,
    next_id: i64,
    calls: Vec<MockCall>,
}

impl MockFarmService {
    pub fn new() -> Self {
        Self {
            next_id: 1000,
            ..Self::default()
        }
    }

    /// Queue a submit outcome; consumed in order, one per call. When the
    /// script runs dry, submit succeeds with a fresh id.
    pub fn push_submit(mut self, outcome: Result<i64, RunnerError>) -> Self {
        self.submit_script.push(outcome);
        self
    }

    /// Queue a scheduler state; the last one repeats once the script runs
    /// dry (default Running).
    pub fn push_state(mut self, state: FarmJobState) -> Self {
        self.state_script.push(state);
        self
    }

    /// Queue one `get_logs` response. When the script runs dry, the job
    /// reports finished with no new lines.
    pub fn push_logs(mut self, outcome: Result<(bool, Vec<LogLine>), RunnerError>) -> Self {
        self.log_script.push(outcome);
        self
    }

    pub fn with_validate_errors(mut self, errors: Vec<String>) -> Self {
        self.validate_errors = errors;
        self
    }

    pub fn with_results(mut self, records: Vec<ResultRecord>) -> Self {
        self.result_records = records;
        self
    }

    pub fn with_details(mut self, details: JobDetails) -> Self {
        self.details = details;
        self
    }

    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    pub fn call_count(&self, matches: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.iter().filter(|call| matches(call)).count()
    }
}

impl FarmService for MockFarmService {
    fn submit(&mut self, _definition: &str) -> Result<i64, RunnerError> {
        self.calls.push(MockCall::Submit);
        if self.submit_script.is_empty() {
            self.next_id += 1;
            return Ok(self.next_id);
        }
        self.submit_script.remove(0)
    }

    fn get_logs(&mut self, job_id: i64, offset: usize) -> Result<(bool, Vec<LogLine>), RunnerError> {
        self.calls.push(MockCall::GetLogs { job_id, offset });
        if self.log_script.is_empty() {
            return Ok((true, Vec::new()));
        }
        self.log_script.remove(0)
    }

    fn job_state(&mut self, job_id: i64) -> Result<FarmJobState, RunnerError> {
        self.calls.push(MockCall::JobState { job_id });
        if self.state_script.is_empty() {
            return Ok(FarmJobState::Running);
        }
        if self.state_script.len() == 1 {
            return Ok(self.state_script[0].clone());
        }
        Ok(self.state_script.remove(0))
    }

    fn cancel(&mut self, job_id: i64) -> Result<(), RunnerError> {
        self.calls.push(MockCall::Cancel { job_id });
        Ok(())
    }

    fn show(&mut self, job_id: i64) -> Result<JobDetails, RunnerError> {
        self.calls.push(MockCall::Show { job_id });
        Ok(self.details.clone())
    }

    fn validate(&mut self, _definition: &str) -> Result<Vec<String>, RunnerError> {
        self.calls.push(MockCall::Validate);
        Ok(self.validate_errors.clone())
    }

    fn results(&mut self, job_id: i64) -> Result<Vec<ResultRecord>, RunnerError> {
        self.calls.push(MockCall::Results { job_id });
        Ok(self.result_records.clone())
    }
}
