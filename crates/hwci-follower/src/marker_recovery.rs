//! Re-joins section markers a faulty transport split across two lines.
//!
//! Some farm serial relays treat the `\r` inside a section marker as a line
//! break, delivering the `ESC section_…:<ts>:<id>` half and the colored
//! header half as separate lines. A two-state machine holds the first half
//! and stitches the pair back together; no coroutine semantics.

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryState {
    Idle,
    HoldingFirstHalf(String),
}

#[derive(Debug)]
pub struct MarkerRecovery {
    first_half: Regex,
    state: RecoveryState,
}

impl MarkerRecovery {
    pub fn new() -> Result<Self, String> {
        // A marker that lost its `\r`: escape, marker word, timestamp, id,
        // and nothing after.
        let first_half = Regex::new(r"^\x1b\[0Ksection_\w+:\d+:[^\s:]+(\[collapsed=true\])?$")
            .map_err(|err| format!("compile split-marker pattern: {err}"))?;
        Ok(Self {
            first_half,
            state: RecoveryState::Idle,
        })
    }

    /// Feed one line; returns the line to emit now, if any.
    pub fn step(&mut self, line: &str) -> Option<String> {
        let (state, emit) = step(std::mem::replace(&mut self.state, RecoveryState::Idle), line, &self.first_half);
        self.state = state;
        emit
    }

    /// Emit whatever is still held at stream end.
    pub fn finish(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, RecoveryState::Idle) {
            RecoveryState::Idle => None,
            RecoveryState::HoldingFirstHalf(half) => Some(half),
        }
    }
}

/// Pure transition function.
fn step(state: RecoveryState, line: &str, first_half: &Regex) -> (RecoveryState, Option<String>) {
    match state {
        RecoveryState::Idle => {
            if first_half.is_match(line) {
                (RecoveryState::HoldingFirstHalf(line.to_string()), None)
            } else {
                (RecoveryState::Idle, Some(line.to_string()))
            }
        }
        RecoveryState::HoldingFirstHalf(half) => {
            if first_half.is_match(line) {
                // Two bare marker halves in a row: the held one is stale.
                (RecoveryState::HoldingFirstHalf(line.to_string()), Some(half))
            } else {
                // Restore the `\r` the transport ate.
                (RecoveryState::Idle, Some(format!("{half}\r{line}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MarkerRecovery;

    fn recovery() -> MarkerRecovery {
        match MarkerRecovery::new() {
            Ok(recovery) => recovery,
            Err(err) => panic!("recovery pattern failed: {err}"),
        }
    }

    #[test]
    fn plain_lines_pass_through() {
        let mut rec = recovery();
        assert_eq!(rec.step("hello"), Some("hello".to_string()));
        assert_eq!(rec.finish(), None);
    }

    #[test]
    fn split_marker_is_rejoined_with_carriage_return() {
        let mut rec = recovery();
        assert_eq!(rec.step("\x1b[0Ksection_start:1700000000:dut_boot"), None);
        assert_eq!(
            rec.step("\x1b[0K\x1b[0;36mBooting\x1b[0m"),
            Some("\x1b[0Ksection_start:1700000000:dut_boot\r\x1b[0K\x1b[0;36mBooting\x1b[0m".to_string())
        );
    }

    #[test]
    fn collapsed_suffix_still_matches_first_half() {
        let mut rec = recovery();
        assert_eq!(
            rec.step("\x1b[0Ksection_start:1700000000:dut_boot[collapsed=true]"),
            None
        );
        assert_eq!(rec.finish().as_deref(), Some("\x1b[0Ksection_start:1700000000:dut_boot[collapsed=true]"));
    }

    #[test]
    fn back_to_back_first_halves_emit_the_stale_one() {
        let mut rec = recovery();
        assert_eq!(rec.step("\x1b[0Ksection_end:1:a"), None);
        assert_eq!(
            rec.step("\x1b[0Ksection_start:2:b"),
            Some("\x1b[0Ksection_end:1:a".to_string())
        );
        assert_eq!(rec.finish().as_deref(), Some("\x1b[0Ksection_start:2:b"));
    }

    #[test]
    fn intact_markers_are_not_held() {
        // A marker that kept its `\r` and header is not a bare first half.
        let mut rec = recovery();
        let intact = "\x1b[0Ksection_start:1:a\r\x1b[0Kheader";
        assert_eq!(rec.step(intact), Some(intact.to_string()));
    }
}
