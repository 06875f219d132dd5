//! Wire model for farm log lines.
//!
//! Each line delivered by the transport is a mapping with a `lvl` and a
//! `msg`. The message is normally a string, but kernel log dumps arrive as a
//! list of strings and structured result records arrive as arbitrary values.
//! Extra keys on the mapping are ignored.

use serde::Deserialize;

/// Log level tag attached to every line by the farm dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum LogLevel {
    Target,
    Debug,
    Results,
    Feedback,
    Warning,
    Error,
    Input,
    /// Dispatcher versions add levels we do not interpret; keep them as-is.
    Other(String),
}

impl LogLevel {
    pub fn slug(&self) -> &str {
        match self {
            Self::Target => "target",
            Self::Debug => "debug",
            Self::Results => "results",
            Self::Feedback => "feedback",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Input => "input",
            Self::Other(other) => other.as_str(),
        }
    }
}

impl From<String> for LogLevel {
    fn from(value: String) -> Self {
        match value.as_str() {
            "target" => Self::Target,
            "debug" => Self::Debug,
            "results" => Self::Results,
            "feedback" => Self::Feedback,
            "warning" => Self::Warning,
            "error" => Self::Error,
            "input" => Self::Input,
            _ => Self::Other(value),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Message payload of a log line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LogMessage {
    Text(String),
    /// Kernel log dump: the dispatcher batches console output into a list.
    Lines(Vec<String>),
    /// Structured payloads (result records and similar).
    Structured(serde_json::Value),
}

/// One unit of input from the farm log stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogLine {
    pub lvl: LogLevel,
    pub msg: LogMessage,
}

impl LogLine {
    pub fn text(lvl: LogLevel, msg: &str) -> Self {
        Self {
            lvl,
            msg: LogMessage::Text(msg.to_string()),
        }
    }

    /// The textual message, if this line carries one.
    pub fn message_text(&self) -> Option<&str> {
        match &self.msg {
            LogMessage::Text(text) => Some(text.as_str()),
            LogMessage::Lines(_) | LogMessage::Structured(_) => None,
        }
    }
}

/// Strip trailing newline sequences the transport appends.
///
/// A message ending in a *bare* carriage return is left intact so the caller
/// can detect it and merge with the following line.
pub fn strip_trailing_newlines(text: &str) -> &str {
    let mut out = text;
    while let Some(stripped) = out.strip_suffix('\n') {
        out = stripped.strip_suffix('\r').unwrap_or(stripped);
    }
    out
}
