//! Command-line entry point, kept separate from `main` so the whole flow
//! is testable against a scripted service.
//!
//! Exit codes: 0 the device-side suite passed, 1 it failed, 2 the run
//! itself could not be completed.

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::config::RunnerConfig;
use crate::controller::JobController;
use crate::diagnostics::MemorySink;
use crate::error::RunnerError;
use crate::service::{call_with_retries, FarmService};

pub const USAGE: &str = "usage: hwci-submit run --replay <script.yaml> \
--definition <file> [--dump-log <path>] [--validate-only]";

#[derive(Debug, Default)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CliOutput {
    fn usage(message: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("{message}\n{USAGE}\n"),
            exit_code: 2,
        }
    }
}

struct RunArgs {
    definition_path: String,
    dump_log: Option<String>,
    validate_only: bool,
}

fn parse_args(args: &[String]) -> Result<RunArgs, CliOutput> {
    let mut iter = args.iter();
    match iter.next().map(String::as_str) {
        Some("run") => {}
        Some(other) => return Err(CliOutput::usage(&format!("unknown command {other}"))),
        None => return Err(CliOutput::usage("missing command")),
    }

    let mut definition_path = None;
    let mut dump_log = None;
    let mut validate_only = false;
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--definition" => match iter.next() {
                Some(value) => definition_path = Some(value.clone()),
                None => return Err(CliOutput::usage("--definition needs a path")),
            },
            "--dump-log" => match iter.next() {
                Some(value) => dump_log = Some(value.clone()),
                None => return Err(CliOutput::usage("--dump-log needs a path")),
            },
            "--validate-only" => validate_only = true,
            other => return Err(CliOutput::usage(&format!("unknown flag {other}"))),
        }
    }
    let Some(definition_path) = definition_path else {
        return Err(CliOutput::usage("--definition is required"));
    };
    Ok(RunArgs {
        definition_path,
        dump_log,
        validate_only,
    })
}

/// Transcript sink the CLI can read back after the controller consumes it.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buffer) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => String::new(),
        }
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut buffer) = self.0.lock() {
            buffer.extend_from_slice(data);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn run_cli<S: FarmService>(
    args: &[String],
    mut service: S,
    lookup: impl Fn(&str) -> Option<String>,
    interrupt: Arc<AtomicBool>,
) -> CliOutput {
    let run_args = match parse_args(args) {
        Ok(run_args) => run_args,
        Err(out) => return out,
    };
    let mut out = CliOutput::default();

    let definition = match std::fs::read_to_string(&run_args.definition_path) {
        Ok(text) => text,
        Err(err) => {
            out.stderr = format!("cannot read {}: {err}\n", run_args.definition_path);
            out.exit_code = 2;
            return out;
        }
    };
    let config = RunnerConfig::from_lookup(lookup);

    // Farm-side validation always runs first; a rejected definition never
    // reaches the retry loop.
    let complaints = match call_with_retries(
        config.transport_attempts,
        config.transport_backoff,
        std::thread::sleep,
        || service.validate(&definition),
    ) {
        Ok(complaints) => complaints,
        Err(err) => {
            out.stderr = format!("validation call failed: {err}\n");
            out.exit_code = 2;
            return out;
        }
    };
    if !complaints.is_empty() {
        let err = RunnerError::InvalidDefinition { errors: complaints };
        out.stderr = format!("{err}\n");
        out.exit_code = 2;
        return out;
    }
    if run_args.validate_only {
        out.stdout.push_str("definition accepted\n");
        return out;
    }

    let transcript = SharedBuf::default();
    let mut controller = match JobController::new(service, config, MemorySink::new()) {
        Ok(controller) => controller,
        Err(err) => {
            out.stderr = format!("{err}\n");
            out.exit_code = 2;
            return out;
        }
    };
    controller = controller
        .with_interrupt(interrupt)
        .with_transcript(Box::new(transcript.clone()));

    let outcome = controller.execute_with_retries(&definition);
    out.stdout.push_str(&transcript.contents());
    if let Ok(snapshot) = serde_json::to_string_pretty(&controller.diagnostics().snapshot()) {
        match &run_args.dump_log {
            Some(path) => {
                if let Err(err) = std::fs::write(path, &snapshot) {
                    out.stderr
                        .push_str(&format!("cannot write {path}: {err}\n"));
                    out.exit_code = 2;
                    return out;
                }
            }
            None => {
                out.stdout.push_str(&snapshot);
                out.stdout.push('\n');
            }
        }
    }
    match outcome {
        Ok(job) => {
            out.stdout.push_str(&format!("final status: {}\n", job.status));
            out.exit_code = i32::from(!job.status.is_ok());
        }
        Err(err) => {
            out.stderr = format!("{err}\n");
            out.exit_code = 2;
        }
    }
    out
}
