//! Closed error taxonomy for the job lifecycle.
//!
//! Errors carry their kind at the origin (transport, timeout, known issue,
//! parse corruption, interrupt); the controller maps the kind to a job
//! status with a single match instead of inspecting runtime type identity.

use std::time::Duration;

use hwci_follower::FollowerError;

use crate::job::Job;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// RPC/transport fault; retried at the transport layer before surfacing.
    #[error("farm transport fault: {message}")]
    Transport { message: String },

    /// The farm reports the job failed for reasons other than the test
    /// script's own verdict (bad definition, provisioning failure).
    #[error("job {job_id} infrastructure failure: {message}")]
    JobInfrastructure { job_id: i64, message: String },

    /// The open section exceeded its allotted duration.
    #[error("section {section_id:?} ran for {elapsed:?}, allowed {allowed:?}")]
    Timeout {
        section_id: String,
        elapsed: Duration,
        allowed: Duration,
    },

    /// The log payload from the transport failed to parse.
    #[error("log payload corrupted: {message}")]
    ParseCorruption { message: String },

    /// A recognized, expected failure signature.
    #[error("known issue detected: {signature}")]
    KnownIssue { signature: String },

    /// The job definition failed farm-side validation.
    #[error("job definition rejected: {}", errors.join("; "))]
    InvalidDefinition { errors: Vec<String> },

    /// Operator interrupt; re-raised after best-effort cancellation.
    #[error("interrupted by operator")]
    Interrupted,

    /// Internal consistency failure (pattern compilation, section misuse).
    #[error("internal error: {message}")]
    Internal { message: String },

    /// The configured retry budget is exhausted.
    #[error("retry budget of {retry_count} exceeded; last attempt: {source}")]
    RetryBudgetExceeded {
        retry_count: usize,
        last_job: Box<Job>,
        source: Box<RunnerError>,
    },
}

impl RunnerError {
    /// Only transport faults are retried at the transport layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<FollowerError> for RunnerError {
    fn from(err: FollowerError) -> Self {
        match err {
            FollowerError::Timeout {
                section_id,
                elapsed,
                allowed,
            } => Self::Timeout {
                section_id,
                elapsed,
                allowed,
            },
            FollowerError::KnownIssue { signature } => Self::KnownIssue { signature },
            FollowerError::Section(section) => Self::Internal {
                message: section.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RunnerError;
    use hwci_follower::FollowerError;
    use std::time::Duration;

    #[test]
    fn only_transport_faults_are_retryable() {
        assert!(RunnerError::Transport {
            message: "fault".to_string()
        }
        .is_retryable());
        assert!(!RunnerError::Interrupted.is_retryable());
        assert!(!RunnerError::ParseCorruption {
            message: "bad yaml".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn follower_errors_keep_their_kind() {
        let timeout = RunnerError::from(FollowerError::Timeout {
            section_id: "boot".to_string(),
            elapsed: Duration::from_secs(601),
            allowed: Duration::from_secs(540),
        });
        assert!(matches!(timeout, RunnerError::Timeout { .. }));

        let issue = RunnerError::from(FollowerError::KnownIssue {
            signature: "kernel-panic".to_string(),
        });
        assert!(matches!(issue, RunnerError::KnownIssue { .. }));
    }
}
