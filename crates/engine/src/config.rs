//! Engine configuration loaded from environment variables.

use std::time::Duration;

/// Runtime knobs of the engine.
///
/// Reads from environment variables:
/// - `ENGINE_QUERY_TIMEOUT_MS`: how long a deferred query may wait (default: `5000`)
/// - `ENGINE_SNAPSHOT_INTERVAL`: events between snapshots, `0` disables (default: `0`)
/// - `ENGINE_MAX_FOLLOW_UPS`: follow-up commands per dispatch (default: `64`)
/// - `ENGINE_WATCH_CAPACITY`: buffered events per watcher (default: `256`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub query_timeout: Duration,
    pub snapshot_interval: u64,
    pub max_follow_up_commands: usize,
    pub watch_capacity: usize,
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            query_timeout: lookup("ENGINE_QUERY_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.query_timeout),
            snapshot_interval: lookup("ENGINE_SNAPSHOT_INTERVAL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.snapshot_interval),
            max_follow_up_commands: lookup("ENGINE_MAX_FOLLOW_UPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_follow_up_commands),
            watch_capacity: lookup("ENGINE_WATCH_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.watch_capacity),
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: u64) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_max_follow_up_commands(mut self, max: usize) -> Self {
        self.max_follow_up_commands = max;
        self
    }

    /// Returns true if a snapshot is due after the stream moved from
    /// `previous` to `current` events.
    pub fn snapshot_due(&self, previous: u64, current: u64) -> bool {
        self.snapshot_interval > 0
            && current / self.snapshot_interval > previous / self.snapshot_interval
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            snapshot_interval: 0,
            max_follow_up_commands: 64,
            watch_capacity: 256,
        }
    }
}
