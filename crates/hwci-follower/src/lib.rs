//! Log following for hardware-farm CI jobs.
//!
//! Turns the raw line stream a farm dispatcher emits into a readable,
//! section-structured transcript: classifies section boundaries, renders
//! GitLab-style fold markers, repairs transport damage (CR line splits,
//! split markers), detects known failure signatures, and watches the open
//! section for staleness.

pub mod classifier;
pub mod error;
pub mod follower;
pub mod hints;
pub mod line;
pub mod marker_recovery;
pub mod section;

pub use error::FollowerError;
pub use follower::LogFollower;
pub use line::{LogLevel, LogLine, LogMessage};
pub use section::{Section, SectionKind, SectionTimeouts};
