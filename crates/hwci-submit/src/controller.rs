//! Drives one remote job through submit → wait-for-start → poll-logs →
//! finalize, retrying transient infrastructure failures up to a bounded
//! count.
//!
//! The controller is the only place errors are caught and translated into a
//! job status; the follower and classifier below it only raise.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use hwci_follower::{LogFollower, LogLine, Section, SectionKind};

use crate::config::RunnerConfig;
use crate::diagnostics::DiagnosticsSink;
use crate::error::RunnerError;
use crate::job::{Job, JobStatus, ResultMarker};
use crate::service::{call_with_retries, infrastructure_failure, FarmService};

/// Inline retries when the log payload arrives corrupted.
const LOG_DECODE_ATTEMPTS: usize = 5;

/// Shared handle over the transcript writer, so the follower's kernel-dump
/// sink and the controller's own output land in the same place.
#[derive(Clone)]
struct Transcript(Arc<Mutex<Box<dyn Write + Send>>>);

impl Transcript {
    fn new(sink: Box<dyn Write + Send>) -> Self {
        Self(Arc::new(Mutex::new(sink)))
    }
}

impl Write for Transcript {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut sink) => sink.write(data),
            Err(_) => Ok(data.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut sink) => sink.flush(),
            Err(_) => Ok(()),
        }
    }
}

fn in_verdict_phase(follower: &LogFollower) -> bool {
    matches!(
        follower.phase(),
        SectionKind::TestCase | SectionKind::PostProcessing
    )
}

pub struct JobController<S: FarmService, D: DiagnosticsSink> {
    service: S,
    config: RunnerConfig,
    diagnostics: D,
    interrupt: Arc<AtomicBool>,
    now: fn() -> DateTime<Utc>,
    sleep: fn(Duration),
    transcript: Transcript,
    result_marker: ResultMarker,
}

impl<S: FarmService, D: DiagnosticsSink> JobController<S, D> {
    pub fn new(service: S, config: RunnerConfig, diagnostics: D) -> Result<Self, RunnerError> {
        Ok(Self {
            service,
            config,
            diagnostics,
            interrupt: Arc::new(AtomicBool::new(false)),
            now: Utc::now,
            sleep: std::thread::sleep,
            transcript: Transcript::new(Box::new(std::io::stdout())),
            result_marker: ResultMarker::new().map_err(RunnerError::internal)?,
        })
    }

    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_transcript(mut self, transcript: Box<dyn Write + Send>) -> Self {
        self.transcript = Transcript::new(transcript);
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    fn check_interrupt(&self) -> Result<(), RunnerError> {
        if self.interrupt.load(Ordering::Relaxed) {
            return Err(RunnerError::Interrupted);
        }
        Ok(())
    }

    /// One RPC call with transport-layer retries.
    fn rpc<T>(&mut self, mut op: impl FnMut(&mut S) -> Result<T, RunnerError>) -> Result<T, RunnerError> {
        let sleep = self.sleep;
        let attempts = self.config.transport_attempts;
        let backoff = self.config.transport_backoff;
        let service = &mut self.service;
        call_with_retries(attempts, backoff, sleep, || op(&mut *service))
    }

    /// Submit the definition; a farm-side refusal surfaces as an error the
    /// outer retry loop treats as "could not submit".
    pub fn submit(&mut self, job: &mut Job, definition: &str) -> Result<(), RunnerError> {
        let id = self.rpc(|service| service.submit(definition))?;
        job.id = Some(id);
        job.status = JobStatus::Submitted;
        Ok(())
    }

    /// Block until the job leaves the scheduler queue. Bounded only by the
    /// caller's overall process timeout; interrupt-checked each turn.
    pub fn wait_for_start(&mut self, job: &Job) -> Result<(), RunnerError> {
        let job_id = job.id.ok_or_else(|| RunnerError::internal("job has no id"))?;
        loop {
            self.check_interrupt()?;
            let state = self.rpc(|service| service.job_state(job_id))?;
            if !state.in_queue() {
                return Ok(());
            }
            (self.sleep)(self.config.poll_interval);
        }
    }

    /// Follow the job's log stream to a verdict. The follower's `close`
    /// runs on every exit path so no section is left open in the
    /// transcript.
    pub fn follow_execution(&mut self, job: &mut Job) -> Result<(), RunnerError> {
        let mut follower = LogFollower::new(self.config.section_timeouts(), self.config.merge_markers)
            .map_err(RunnerError::internal)?
            .with_clock(self.now)
            .with_dump_sink(Box::new(self.transcript.clone()));
        follower.open_section(Section::new(
            "hwci_submit",
            "Waiting for hardware test job",
            SectionKind::Unknown,
            true,
        ))?;

        let outcome = self.follow_loop(&mut follower, job);
        for line in follower.close() {
            let _ = writeln!(self.transcript, "{line}");
        }
        outcome
    }

    fn follow_loop(&mut self, follower: &mut LogFollower, job: &mut Job) -> Result<(), RunnerError> {
        let job_id = job.id.ok_or_else(|| RunnerError::internal("job has no id"))?;
        job.heartbeat((self.now)());

        let mut farm_finished = false;
        while !job.status.is_finished() {
            self.check_interrupt()?;
            if farm_finished {
                // Stream ended without a verdict; finalize below.
                break;
            }
            (self.sleep)(self.config.poll_interval);

            let (finished, lines) = self.fetch_logs(job_id, job.log_offset)?;
            farm_finished = finished;
            job.log_offset += lines.len();

            // In a verdict-bearing phase, truncate the batch at the marker
            // before the follower can buffer the post-verdict noise.
            let lines = if in_verdict_phase(follower) {
                self.result_marker.parse_job_result_from_log(job, lines)
            } else {
                lines
            };

            let alive = follower.feed(&lines)?;
            if alive {
                job.heartbeat((self.now)());
            }

            let mut display = follower.flush();
            if !job.status.is_finished() && in_verdict_phase(follower) {
                // The batch that opened the test-case section can itself
                // carry the marker; scan the display lines it produced.
                let hit = display.iter().enumerate().find_map(|(index, text)| {
                    self.result_marker
                        .verdict(text)
                        .map(|status| (index, status))
                });
                if let Some((index, status)) = hit {
                    job.status = status;
                    display.truncate(index + 1);
                }
            }
            for line in display {
                let _ = writeln!(self.transcript, "{line}");
            }
        }

        if !matches!(job.status, JobStatus::Pass | JobStatus::Fail) {
            // The device never produced a verdict: ask the farm whether the
            // job itself failed, otherwise treat the run as a test failure.
            let records = self.rpc(|service| service.results(job_id))?;
            if let Some(message) = infrastructure_failure(&records) {
                return Err(RunnerError::JobInfrastructure { job_id, message });
            }
            job.status = JobStatus::Fail;
        }
        Ok(())
    }

    /// Fetch the next log batch, tolerating up to `LOG_DECODE_ATTEMPTS`
    /// corrupted payloads before giving up on the attempt.
    fn fetch_logs(
        &mut self,
        job_id: i64,
        offset: usize,
    ) -> Result<(bool, Vec<LogLine>), RunnerError> {
        let mut corrupted = 0;
        loop {
            match self.rpc(|service| service.get_logs(job_id, offset)) {
                Ok(batch) => return Ok(batch),
                Err(RunnerError::ParseCorruption { message }) => {
                    corrupted += 1;
                    if corrupted >= LOG_DECODE_ATTEMPTS {
                        return Err(RunnerError::ParseCorruption { message });
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Cancel the in-flight job as a courtesy and map the error kind to a
    /// job status.
    pub fn handle_error(&mut self, job: &mut Job, err: &RunnerError) {
        if let Some(job_id) = job.id {
            let _ = self.service.cancel(job_id);
        }
        job.status = match err {
            RunnerError::KnownIssue { .. } => JobStatus::Canceled,
            RunnerError::Timeout { .. } => JobStatus::Hung,
            RunnerError::Transport { .. }
            | RunnerError::JobInfrastructure { .. }
            | RunnerError::ParseCorruption { .. } => JobStatus::Failed,
            RunnerError::Interrupted => JobStatus::Interrupted,
            _ => JobStatus::SubmitterError,
        };
    }

    fn run_attempt(
        &mut self,
        job: &mut Job,
        index: usize,
        definition: &str,
    ) -> Result<(), RunnerError> {
        self.submit(job, definition)?;
        if let Some(job_id) = job.id {
            self.diagnostics
                .update_job(index, "farm_job_id", json!(job_id));
        }
        self.wait_for_start(job)?;
        if let Some(job_id) = job.id {
            if let Ok(details) = self.rpc(|service| service.show(job_id)) {
                if let Some(device) = details.device {
                    self.diagnostics.update_job(index, "device", json!(device));
                }
            }
        }
        self.follow_execution(job)
    }

    /// Run the job, retrying failed attempts up to the configured budget.
    ///
    /// A clean device-side pass or fail returns immediately and is never
    /// retried. An operator interrupt aborts the loop after bookkeeping.
    pub fn execute_with_retries(&mut self, definition: &str) -> Result<Job, RunnerError> {
        let max_attempts = self.config.retry_count + 1;
        let mut last: Option<(Job, RunnerError)> = None;

        for attempt in 1..=max_attempts {
            let index = self.diagnostics.append_job();
            let mut job = Job::new((self.now)(), attempt);
            let started = (self.now)();
            self.diagnostics.update_job(index, "attempt", json!(attempt));
            self.diagnostics.update_job(
                index,
                "submitted_at",
                json!(started.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );

            let outcome = self.run_attempt(&mut job, index, definition);
            let failure = match outcome {
                Ok(()) => None,
                Err(err) => {
                    self.handle_error(&mut job, &err);
                    self.diagnostics
                        .update_job(index, "fail_reason", json!(err.to_string()));
                    Some(err)
                }
            };

            let finished = (self.now)();
            let duration = finished.signed_duration_since(started).num_seconds();
            self.diagnostics
                .update_job(index, "status", json!(job.status.slug()));
            self.diagnostics
                .update_job(index, "duration_seconds", json!(duration));
            let _ = writeln!(
                self.transcript,
                "attempt {attempt}/{max_attempts}: {status} after {duration}s",
                status = job.status,
            );

            match failure {
                None => {
                    self.diagnostics.record("status", json!(job.status.slug()));
                    return Ok(job);
                }
                Some(RunnerError::Interrupted) => {
                    self.diagnostics.record("status", json!(job.status.slug()));
                    return Err(RunnerError::Interrupted);
                }
                Some(err) => last = Some((job, err)),
            }
        }

        match last {
            Some((job, err)) => {
                self.diagnostics.record("status", json!(job.status.slug()));
                Err(RunnerError::RetryBudgetExceeded {
                    retry_count: self.config.retry_count,
                    last_job: Box::new(job),
                    source: Box::new(err),
                })
            }
            None => Err(RunnerError::internal("no attempts were made")),
        }
    }
}
