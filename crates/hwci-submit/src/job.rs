//! One attempt to run a test job on a remote device.

use chrono::{DateTime, Utc};
use regex::Regex;

use hwci_follower::LogLine;

/// Lifecycle status of one job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    NotSubmitted,
    Submitted,
    Running,
    Pass,
    Fail,
    Hung,
    Canceled,
    Failed,
    Interrupted,
    SubmitterError,
}

impl JobStatus {
    pub fn slug(self) -> &'static str {
        match self {
            Self::NotSubmitted => "not_submitted",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Hung => "hung",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
            Self::SubmitterError => "job_submitter_error",
        }
    }

    pub fn is_finished(self) -> bool {
        !matches!(self, Self::NotSubmitted | Self::Submitted | Self::Running)
    }

    /// Only a clean device-side pass counts as success.
    pub fn is_ok(self) -> bool {
        self == Self::Pass
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// One attempt driven through submit → wait → follow → finalize.
#[derive(Debug, Clone)]
pub struct Job {
    /// Assigned by the farm at submission; immutable once set.
    pub id: Option<i64>,
    pub status: JobStatus,
    /// How many log lines have been consumed from the farm so far.
    pub log_offset: usize,
    pub last_heartbeat: DateTime<Utc>,
    pub attempt: usize,
}

impl Job {
    pub fn new(now: DateTime<Utc>, attempt: usize) -> Self {
        Self {
            id: None,
            status: JobStatus::NotSubmitted,
            log_offset: 0,
            last_heartbeat: now,
            attempt,
        }
    }

    /// Refresh liveness; the first heartbeat moves a submitted job to
    /// running.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = now;
        if self.status == JobStatus::Submitted {
            self.status = JobStatus::Running;
        }
    }
}

/// Scans log batches for the test shell's final verdict marker.
pub struct ResultMarker {
    pattern: Regex,
}

impl ResultMarker {
    pub fn new() -> Result<Self, String> {
        let pattern = Regex::new(r"hwci: mesa: (pass|fail)")
            .map_err(|err| format!("compile result marker pattern: {err}"))?;
        Ok(Self { pattern })
    }

    /// The verdict carried by `text`, if the marker is present.
    pub fn verdict(&self, text: &str) -> Option<JobStatus> {
        let caps = self.pattern.captures(text)?;
        Some(match caps.get(1).map(|m| m.as_str()) {
            Some("pass") => JobStatus::Pass,
            _ => JobStatus::Fail,
        })
    }

    /// Look for the verdict in `lines`; on a hit, set the job's status and
    /// truncate the batch to end at the marker line. Lines after the marker
    /// are post-verdict noise and are dropped.
    pub fn parse_job_result_from_log(&self, job: &mut Job, mut lines: Vec<LogLine>) -> Vec<LogLine> {
        for (index, line) in lines.iter().enumerate() {
            let Some(text) = line.message_text() else {
                continue;
            };
            let Some(status) = self.verdict(text) else {
                continue;
            };
            job.status = status;
            lines.truncate(index + 1);
            break;
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::{Job, JobStatus, ResultMarker};
    use chrono::{TimeZone, Utc};
    use hwci_follower::{LogLevel, LogLine};

    fn now() -> chrono::DateTime<Utc> {
        match Utc.timestamp_opt(1_700_000_000, 0) {
            chrono::LocalResult::Single(instant) => instant,
            _ => panic!("invalid test timestamp"),
        }
    }

    fn marker() -> ResultMarker {
        match ResultMarker::new() {
            Ok(marker) => marker,
            Err(err) => panic!("marker pattern failed: {err}"),
        }
    }

    #[test]
    fn first_heartbeat_moves_submitted_to_running() {
        let mut job = Job::new(now(), 1);
        job.status = JobStatus::Submitted;
        job.heartbeat(now());
        assert_eq!(job.status, JobStatus::Running);
        // A later heartbeat does not disturb a terminal status.
        job.status = JobStatus::Pass;
        job.heartbeat(now());
        assert_eq!(job.status, JobStatus::Pass);
    }

    #[test]
    fn terminal_statuses_are_finished() {
        for status in [
            JobStatus::Pass,
            JobStatus::Fail,
            JobStatus::Hung,
            JobStatus::Canceled,
            JobStatus::Failed,
            JobStatus::Interrupted,
            JobStatus::SubmitterError,
        ] {
            assert!(status.is_finished(), "{status} should be terminal");
        }
        for status in [JobStatus::NotSubmitted, JobStatus::Submitted, JobStatus::Running] {
            assert!(!status.is_finished(), "{status} should not be terminal");
        }
        assert!(JobStatus::Pass.is_ok());
        assert!(!JobStatus::Fail.is_ok());
    }

    #[test]
    fn verdict_marker_sets_status_and_truncates() {
        let mut job = Job::new(now(), 1);
        job.status = JobStatus::Running;
        let lines = vec![
            LogLine::text(LogLevel::Debug, "STARTRUN foo"),
            LogLine::text(LogLevel::Target, "hwci: mesa: pass"),
            LogLine::text(LogLevel::Target, "post-verdict noise"),
        ];
        let kept = marker().parse_job_result_from_log(&mut job, lines);
        assert_eq!(job.status, JobStatus::Pass);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].message_text(), Some("hwci: mesa: pass"));
    }

    #[test]
    fn verdict_reads_the_marker_out_of_surrounding_text() {
        let marker = marker();
        assert_eq!(marker.verdict("hwci: mesa: pass"), Some(JobStatus::Pass));
        assert_eq!(
            marker.verdict("\x1b[0;36mhwci: mesa: fail\x1b[0m"),
            Some(JobStatus::Fail)
        );
        assert_eq!(marker.verdict("hwci: mesa: running"), None);
    }

    #[test]
    fn fail_marker_sets_fail() {
        let mut job = Job::new(now(), 1);
        let lines = vec![LogLine::text(LogLevel::Target, "hwci: mesa: fail")];
        let _ = marker().parse_job_result_from_log(&mut job, lines);
        assert_eq!(job.status, JobStatus::Fail);
    }

    #[test]
    fn batches_without_marker_leave_status_alone() {
        let mut job = Job::new(now(), 1);
        job.status = JobStatus::Running;
        let lines = vec![LogLine::text(LogLevel::Target, "still going")];
        let kept = marker().parse_job_result_from_log(&mut job, lines);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(kept.len(), 1);
    }
}
