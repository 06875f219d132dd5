//! Detection of known hang/error signatures in a batch of log lines.
//!
//! These are recognized, expected failure modes of the device farm (driver
//! resets, flaky USB NICs, kernel panics) that should short-circuit the run
//! instead of waiting for the watchdog to fire.

use regex::Regex;

use crate::error::FollowerError;
use crate::line::{LogLine, LogMessage};

struct Hint {
    pattern: Regex,
    signature: &'static str,
}

/// Matches a whole feed batch against the known-issue signature list.
pub struct HintDetector {
    hints: Vec<Hint>,
}

impl HintDetector {
    pub fn new() -> Result<Self, String> {
        let table: [(&str, &'static str); 4] = [
            (r"Kernel panic - not syncing", "kernel-panic"),
            (r"rcu: INFO: rcu_\w+ detected stalls", "rcu-stall"),
            (
                r"r8152 \S+ eth0: Invalid header when reading pass-thru MAC addr",
                "r8152-mac-corruption",
            ),
            (r"sunxi-wdt .*: Watchdog hardware reset", "sunxi-watchdog-reset"),
        ];
        let mut hints = Vec::with_capacity(table.len());
        for (pattern, signature) in table.into_iter() {
            let pattern = Regex::new(pattern)
                .map_err(|err| format!("compile hint pattern {pattern:?}: {err}"))?;
            hints.push(Hint { pattern, signature });
        }
        Ok(Self { hints })
    }

    /// Error out on the first line in the batch carrying a known signature.
    pub fn detect(&self, lines: &[LogLine]) -> Result<(), FollowerError> {
        for line in lines {
            let texts: Vec<&str> = match &line.msg {
                LogMessage::Text(text) => vec![text.as_str()],
                LogMessage::Lines(lines) => lines.iter().map(String::as_str).collect(),
                LogMessage::Structured(_) => continue,
            };
            for hint in &self.hints {
                if texts.iter().any(|text| hint.pattern.is_match(text)) {
                    return Err(FollowerError::KnownIssue {
                        signature: hint.signature.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::HintDetector;
    use crate::error::FollowerError;
    use crate::line::{LogLevel, LogLine};

    fn detector() -> HintDetector {
        match HintDetector::new() {
            Ok(detector) => detector,
            Err(err) => panic!("hint table failed: {err}"),
        }
    }

    #[test]
    fn clean_batch_passes() {
        let lines = vec![
            LogLine::text(LogLevel::Target, "running tests"),
            LogLine::text(LogLevel::Debug, "<STARTTC> kms_flip"),
        ];
        assert!(detector().detect(&lines).is_ok());
    }

    #[test]
    fn kernel_panic_is_a_known_issue() {
        let lines = vec![LogLine::text(
            LogLevel::Target,
            "[  12.0] Kernel panic - not syncing: Attempted to kill init!",
        )];
        match detector().detect(&lines) {
            Err(FollowerError::KnownIssue { signature }) => {
                assert_eq!(signature, "kernel-panic");
            }
            other => panic!("expected known issue, got {other:?}"),
        }
    }

    #[test]
    fn kernel_dump_lists_are_scanned_too() {
        let dump: LogLine = match serde_yaml::from_str(
            "{lvl: debug, msg: ['[ 3.1] ok', '[ 3.2] rcu: INFO: rcu_sched detected stalls on CPUs']}",
        ) {
            Ok(line) => line,
            Err(err) => panic!("parse failed: {err}"),
        };
        match detector().detect(&[dump]) {
            Err(FollowerError::KnownIssue { signature }) => assert_eq!(signature, "rcu-stall"),
            other => panic!("expected known issue, got {other:?}"),
        }
    }
}
