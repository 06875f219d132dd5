//! Runner configuration.
//!
//! The controller accepts plain values; only the binary touches the
//! environment, through `from_lookup` with an injected lookup so tests never
//! depend on process state.

use std::time::Duration;

use hwci_follower::SectionTimeouts;

pub const ENV_BOOT_TIMEOUT: &str = "HWCI_BOOT_TIMEOUT_SECONDS";
pub const ENV_DEVICE_HANG_TIMEOUT: &str = "HWCI_DEVICE_HANG_TIMEOUT_SECONDS";
pub const ENV_POLL_INTERVAL: &str = "HWCI_POLL_INTERVAL_SECONDS";
pub const ENV_RETRY_COUNT: &str = "HWCI_RETRY_COUNT";

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Watchdog budget for the boot section.
    pub boot_timeout: Duration,
    /// Watchdog budget for every on-device section.
    pub device_hang_timeout: Duration,
    /// Fixed interval between log polls and queue-state polls.
    pub poll_interval: Duration,
    /// Job-level retries after the first attempt.
    pub retry_count: usize,
    /// Transport-layer tries per RPC call.
    pub transport_attempts: usize,
    pub transport_backoff: Duration,
    /// Whether this farm's relay splits section markers across lines.
    pub merge_markers: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            boot_timeout: Duration::from_secs(9 * 60),
            device_hang_timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(5),
            retry_count: 2,
            transport_attempts: 5,
            transport_backoff: Duration::from_secs(10),
            merge_markers: true,
        }
    }
}

impl RunnerConfig {
    /// Overlay integer overrides from an env-style lookup; malformed values
    /// keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(secs) = parse_seconds(&lookup, ENV_BOOT_TIMEOUT) {
            config.boot_timeout = secs;
        }
        if let Some(secs) = parse_seconds(&lookup, ENV_DEVICE_HANG_TIMEOUT) {
            config.device_hang_timeout = secs;
        }
        if let Some(secs) = parse_seconds(&lookup, ENV_POLL_INTERVAL) {
            config.poll_interval = secs;
        }
        if let Some(count) = lookup(ENV_RETRY_COUNT).and_then(|v| v.trim().parse().ok()) {
            config.retry_count = count;
        }
        config
    }

    pub fn section_timeouts(&self) -> SectionTimeouts {
        SectionTimeouts::new(self.boot_timeout, self.device_hang_timeout)
    }
}

fn parse_seconds(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    lookup(key)?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
