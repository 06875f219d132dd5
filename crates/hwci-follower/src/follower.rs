//! Stateful transformation from a raw line stream to display output,
//! section transitions, liveness evidence, and watchdog staleness.
//!
//! The follower owns the "current section" and an output buffer of
//! display-ready strings. `feed` consumes one batch of lines and reports
//! whether the device showed signs of life; `close` finishes any open
//! section and drains the buffer, and must run on every exit path of the
//! driving loop.

use std::io::Write;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::classifier::SectionClassifier;
use crate::error::FollowerError;
use crate::hints::HintDetector;
use crate::line::{strip_trailing_newlines, LogLevel, LogLine, LogMessage};
use crate::marker_recovery::MarkerRecovery;
use crate::section::{Section, SectionKind, SectionTimeouts, COLOR_ATTENTION, COLOR_RESET};

pub struct LogFollower {
    classifier: SectionClassifier,
    hints: HintDetector,
    recovery: MarkerRecovery,
    kernel_prefix: Regex,
    timeouts: SectionTimeouts,
    current_section: Option<Section>,
    section_history: Vec<Section>,
    buffer: Vec<String>,
    held: Option<String>,
    merge_markers: bool,
    closed: bool,
    now: fn() -> DateTime<Utc>,
    dump_sink: Box<dyn Write + Send>,
}

impl LogFollower {
    pub fn new(timeouts: SectionTimeouts, merge_markers: bool) -> Result<Self, String> {
        Ok(Self {
            classifier: SectionClassifier::with_default_rules()?,
            hints: HintDetector::new()?,
            recovery: MarkerRecovery::new()?,
            kernel_prefix: Regex::new(r"^\[\s*\d+\.\d+\]")
                .map_err(|err| format!("compile kernel prefix pattern: {err}"))?,
            timeouts,
            current_section: None,
            section_history: Vec::new(),
            buffer: Vec::new(),
            held: None,
            merge_markers,
            closed: false,
            now: Utc::now,
            dump_sink: Box::new(std::io::stdout()),
        })
    }

    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_dump_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.dump_sink = sink;
        self
    }

    pub fn current_section(&self) -> Option<&Section> {
        self.current_section.as_ref()
    }

    pub fn section_history(&self) -> &[Section] {
        &self.section_history
    }

    /// Kind of the open section, or Unknown when none is.
    pub fn phase(&self) -> SectionKind {
        self.current_section
            .as_ref()
            .map(|section| section.kind())
            .unwrap_or(SectionKind::Unknown)
    }

    /// Transition to `section`: close the current one (its end marker is
    /// buffered first), then open the new one. An unchanged id is a no-op,
    /// defending against duplicate boundary lines from interleaved
    /// transports.
    pub fn open_section(&mut self, mut section: Section) -> Result<(), FollowerError> {
        let same = self
            .current_section
            .as_ref()
            .is_some_and(|current| current.id() == section.id());
        if same {
            return Ok(());
        }
        if let Some(mut current) = self.current_section.take() {
            let marker = current.end((self.now)())?;
            self.buffer.push(marker);
            self.section_history.push(current);
        }
        let marker = section.start((self.now)())?;
        self.buffer.push(marker);
        self.current_section = Some(section);
        Ok(())
    }

    /// Consume one batch of lines; returns whether the device appears alive.
    pub fn feed(&mut self, lines: &[LogLine]) -> Result<bool, FollowerError> {
        self.check_watchdog()?;

        let mut alive = false;
        for line in lines {
            let text = match &line.msg {
                LogMessage::Text(text) => text.clone(),
                LogMessage::Lines(dump) if line.lvl == LogLevel::Debug => {
                    self.print_kernel_dump(dump);
                    continue;
                }
                // Lists at other levels are transport quirks; flatten them.
                LogMessage::Lines(parts) => parts.join("\n"),
                LogMessage::Structured(_) => {
                    // Result records carry no display text but are evidence
                    // the job is progressing.
                    alive = true;
                    continue;
                }
            };

            let mut text = strip_trailing_newlines(&text).to_string();
            if let Some(held) = self.held.take() {
                text = format!("{held}{text}");
            }
            if self.kernel_prefix.is_match(&text) {
                self.print_kernel_dump(std::slice::from_ref(&text));
                continue;
            }
            if let Some(stripped) = text.strip_suffix('\r') {
                // The transport conflates CR with line breaks; merge with
                // the next line instead of processing half a message.
                self.held = Some(stripped.to_string());
                continue;
            }

            alive = true;

            let work = LogLine::text(line.lvl.clone(), &text);
            if let Some(section) = self.classifier.classify(&work) {
                self.open_section(section)?;
            }
            if let Some(display) = self.parse_line_to_display(&line.lvl, text) {
                if !display.is_empty() {
                    self.buffer.push(display);
                }
            }
        }

        self.hints.detect(lines)?;
        Ok(alive)
    }

    /// Drain the buffered display lines, FIFO.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }

    /// Finish any open section and drain the remainder of the buffer.
    ///
    /// Idempotent; the driving loop calls this on every exit path, normal or
    /// error, so no section is ever left open in the transcript.
    pub fn close(&mut self) -> Vec<String> {
        if !self.closed {
            self.closed = true;
            if let Some(rest) = self.recovery.finish() {
                self.buffer.push(rest);
            }
            if let Some(held) = self.held.take() {
                self.buffer.push(held);
            }
            if let Some(mut current) = self.current_section.take() {
                if let Ok(marker) = current.end((self.now)()) {
                    self.buffer.push(marker);
                }
                self.section_history.push(current);
            }
        }
        self.flush()
    }

    fn check_watchdog(&self) -> Result<(), FollowerError> {
        let Some(section) = &self.current_section else {
            return Ok(());
        };
        let allowed = self.timeouts.allowed(section.kind());
        if let Some(elapsed) = section.elapsed((self.now)()) {
            if elapsed > allowed {
                return Err(FollowerError::Timeout {
                    section_id: section.id().to_string(),
                    elapsed,
                    allowed,
                });
            }
        }
        Ok(())
    }

    fn parse_line_to_display(&mut self, lvl: &LogLevel, text: String) -> Option<String> {
        match lvl {
            LogLevel::Results | LogLevel::Feedback | LogLevel::Debug => None,
            LogLevel::Warning | LogLevel::Error => {
                Some(format!("{COLOR_ATTENTION}{text}{COLOR_RESET}"))
            }
            LogLevel::Input => Some(format!("$ {text}")),
            LogLevel::Target => {
                if self.merge_markers {
                    self.recovery.step(&text)
                } else {
                    Some(text)
                }
            }
            LogLevel::Other(_) => Some(text),
        }
    }

    fn print_kernel_dump(&mut self, lines: &[String]) {
        for line in lines {
            let _ = writeln!(self.dump_sink, "{line}");
        }
    }
}
