//! Named, timestamped spans of CI output ("GitLab sections").
//!
//! A section renders a `section_start:<unix>:<id>` / `section_end:<unix>:<id>`
//! marker pair that CI displays fold into collapsible blocks. The textual
//! shape of the markers is a compatibility point with the display tooling and
//! must not drift.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Erase-to-end-of-line control sequence that brackets every marker.
pub const MARKER_ESCAPE: &str = "\x1b[0K";
/// Section header color.
pub const COLOR_HEADER: &str = "\x1b[0;36m";
/// Attention color for warning/error lines.
pub const COLOR_ATTENTION: &str = "\x1b[1;31m";
pub const COLOR_RESET: &str = "\x1b[0m";

pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(9 * 60);
pub const DEFAULT_DEVICE_HANG_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Which phase of a farm job a section covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Unknown,
    Boot,
    DutSuite,
    NonDutSuite,
    TestCase,
    PostProcessing,
}

impl SectionKind {
    pub fn slug(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Boot => "boot",
            Self::DutSuite => "dut-suite",
            Self::NonDutSuite => "non-dut-suite",
            Self::TestCase => "test-case",
            Self::PostProcessing => "post-processing",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Per-kind watchdog budgets with a single fallback for kinds not listed.
#[derive(Debug, Clone)]
pub struct SectionTimeouts {
    budgets: HashMap<SectionKind, Duration>,
    fallback: Duration,
}

impl Default for SectionTimeouts {
    fn default() -> Self {
        Self::new(DEFAULT_BOOT_TIMEOUT, DEFAULT_DEVICE_HANG_TIMEOUT)
    }
}

impl SectionTimeouts {
    /// The device-hang budget applies to every on-device phase; booting gets
    /// its own, longer budget.
    pub fn new(boot: Duration, device_hang: Duration) -> Self {
        let mut budgets = HashMap::new();
        budgets.insert(SectionKind::Boot, boot);
        budgets.insert(SectionKind::DutSuite, device_hang);
        budgets.insert(SectionKind::NonDutSuite, device_hang);
        budgets.insert(SectionKind::TestCase, device_hang);
        budgets.insert(SectionKind::PostProcessing, device_hang);
        Self {
            budgets,
            fallback: DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    pub fn allowed(&self, kind: SectionKind) -> Duration {
        self.budgets.get(&kind).copied().unwrap_or(self.fallback)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SectionError {
    #[error("section {id:?} started twice")]
    AlreadyStarted { id: String },
    #[error("section {id:?} ended before it was started")]
    NotStarted { id: String },
    #[error("section {id:?} already finished")]
    AlreadyEnded { id: String },
    #[error("section {id:?} ended before its own start time")]
    ClockSkew { id: String },
}

/// Replace every character outside `[A-Za-z0-9_-]` with `-`.
///
/// Free-text headers become usable marker identifiers; applying it twice is a
/// no-op.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// One named phase of CI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    id: String,
    header: String,
    kind: SectionKind,
    collapsed: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Section {
    pub fn new(id: &str, header: &str, kind: SectionKind, collapsed: bool) -> Self {
        Self {
            id: sanitize_id(id),
            header: header.to_string(),
            kind,
            collapsed,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Record the start time and render the opening marker.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<String, SectionError> {
        if self.ended_at.is_some() {
            return Err(SectionError::AlreadyEnded {
                id: self.id.clone(),
            });
        }
        if self.started_at.is_some() {
            return Err(SectionError::AlreadyStarted {
                id: self.id.clone(),
            });
        }
        self.started_at = Some(now);
        let collapsed = if self.collapsed { "[collapsed=true]" } else { "" };
        Ok(format!(
            "{esc}section_start:{ts}:{id}{collapsed}\r{esc}{color}{header}{reset}",
            esc = MARKER_ESCAPE,
            ts = now.timestamp(),
            id = self.id,
            collapsed = collapsed,
            color = COLOR_HEADER,
            header = self.header,
            reset = COLOR_RESET,
        ))
    }

    /// Record the end time and render the closing marker.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<String, SectionError> {
        let Some(started_at) = self.started_at else {
            return Err(SectionError::NotStarted {
                id: self.id.clone(),
            });
        };
        if self.ended_at.is_some() {
            return Err(SectionError::AlreadyEnded {
                id: self.id.clone(),
            });
        }
        if now < started_at {
            // Internal consistency violation, not user-recoverable.
            return Err(SectionError::ClockSkew {
                id: self.id.clone(),
            });
        }
        self.ended_at = Some(now);
        Ok(format!(
            "{esc}section_end:{ts}:{id}\r{esc}",
            esc = MARKER_ESCAPE,
            ts = now.timestamp(),
            id = self.id,
        ))
    }

    /// Elapsed span: `end - start` once closed, `now - start` while open.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started_at = self.started_at?;
        let until = self.ended_at.unwrap_or(now);
        until.signed_duration_since(started_at).to_std().ok()
    }
}
