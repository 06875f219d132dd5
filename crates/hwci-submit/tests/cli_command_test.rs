#![allow(clippy::expect_used, clippy::unwrap_used)]

//! CLI runs against replay scripts and the scripted mock service.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use hwci_submit::{run_cli, CliOutput, FarmService, MockFarmService, ReplayFarmService};

struct TempDir(PathBuf);

impl TempDir {
    fn new(tag: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "hwci-submit-{tag}-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path).expect("create temp dir");
        Self(path)
    }

    fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.0.join(name);
        std::fs::write(&path, contents).expect("write temp file");
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn test_env(key: &str) -> Option<String> {
    (key == "HWCI_POLL_INTERVAL_SECONDS").then(|| "0".to_string())
}

fn run(list: &[&str], service: impl FarmService) -> CliOutput {
    let args: Vec<String> = list.iter().map(|s| s.to_string()).collect();
    run_cli(&args, service, test_env, Arc::new(AtomicBool::new(false)))
}

const PASSING_SCRIPT: &str = "\
job_id: 4242
device: rk3399-gru-kevin-3
states: [Submitted, Scheduled, Running]
batches:
  - lines:
      - {lvl: debug, msg: '<STARTRUN> mesa-ci'}
      - {lvl: target, msg: '<STARTTC> deqp-gles2'}
  - finished: true
    lines:
      - {lvl: target, msg: 'hwci: mesa: pass'}
";

const DEFINITION: &str = "\
job_name: mesa-ci test
timeouts:
  job:
    minutes: 30
";

#[test]
fn run_replays_a_passing_job_to_exit_zero() {
    let dir = TempDir::new("run-pass");
    let definition = dir.file("definition.yaml", DEFINITION);
    let service = ReplayFarmService::from_yaml(PASSING_SCRIPT).expect("script parses");

    let out = run(
        &["run", "--definition", definition.to_str().expect("utf8 path")],
        service,
    );
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("final status: pass"));
    assert!(out.stdout.contains("section_start:"));
    assert!(out.stdout.contains("\"device\": \"rk3399-gru-kevin-3\""));
}

#[test]
fn run_replays_a_failing_job_to_exit_one() {
    let script = PASSING_SCRIPT.replace("hwci: mesa: pass", "hwci: mesa: fail");
    let dir = TempDir::new("run-fail");
    let definition = dir.file("definition.yaml", DEFINITION);
    let service = ReplayFarmService::from_yaml(&script).expect("script parses");

    let out = run(
        &["run", "--definition", definition.to_str().expect("utf8 path")],
        service,
    );
    assert_eq!(out.exit_code, 1, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("final status: fail"));
}

#[test]
fn dump_log_writes_the_snapshot_to_a_file() {
    let dir = TempDir::new("dump-log");
    let definition = dir.file("definition.yaml", DEFINITION);
    let dump_path = dir.path("diagnostics.json");
    let service = ReplayFarmService::from_yaml(PASSING_SCRIPT).expect("script parses");

    let out = run(
        &[
            "run",
            "--definition",
            definition.to_str().expect("utf8 path"),
            "--dump-log",
            dump_path.to_str().expect("utf8 path"),
        ],
        service,
    );
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);

    let snapshot = std::fs::read_to_string(&dump_path).expect("snapshot file");
    assert!(snapshot.contains("\"device\": \"rk3399-gru-kevin-3\""));
    assert!(snapshot.contains("\"status\": \"pass\""));
    // The snapshot goes to the file, not the terminal.
    assert!(!out.stdout.contains("\"device\""));
}

#[test]
fn validate_only_accepts_a_clean_definition() {
    let dir = TempDir::new("validate-ok");
    let definition = dir.file("definition.yaml", DEFINITION);

    let out = run(
        &[
            "run",
            "--definition",
            definition.to_str().expect("utf8 path"),
            "--validate-only",
        ],
        MockFarmService::new(),
    );
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stdout.contains("definition accepted"));
}

#[test]
fn validate_only_surfaces_farm_complaints() {
    let dir = TempDir::new("validate-bad");
    let definition = dir.file("definition.yaml", DEFINITION);
    let service = MockFarmService::new().with_validate_errors(vec![
        "missing job timeout".to_string(),
        "unknown device type".to_string(),
    ]);

    let out = run(
        &[
            "run",
            "--definition",
            definition.to_str().expect("utf8 path"),
            "--validate-only",
        ],
        service,
    );
    assert_eq!(out.exit_code, 2);
    assert!(out.stderr.contains("job definition rejected"));
    assert!(out.stderr.contains("missing job timeout"));
    assert!(out.stderr.contains("unknown device type"));
}

#[test]
fn rejected_definitions_never_reach_submission() {
    let dir = TempDir::new("run-rejected");
    let definition = dir.file("definition.yaml", DEFINITION);
    let service =
        MockFarmService::new().with_validate_errors(vec!["missing job timeout".to_string()]);

    let out = run(
        &["run", "--definition", definition.to_str().expect("utf8 path")],
        service,
    );
    assert_eq!(out.exit_code, 2);
    assert!(out.stderr.contains("job definition rejected"));
    assert!(!out.stdout.contains("attempt 1"));
}
