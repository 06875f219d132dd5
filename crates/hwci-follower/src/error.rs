//! Errors the follower raises; it never catches.

use std::time::Duration;

use crate::section::SectionError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FollowerError {
    /// The open section exceeded its allotted duration.
    #[error("section {section_id:?} ran for {elapsed:?}, allowed {allowed:?}")]
    Timeout {
        section_id: String,
        elapsed: Duration,
        allowed: Duration,
    },

    /// A recognized, expected failure signature was seen in the stream.
    #[error("known issue detected: {signature}")]
    KnownIssue { signature: String },

    /// Section lifecycle violation; internal consistency error.
    #[error(transparent)]
    Section(#[from] SectionError),
}
