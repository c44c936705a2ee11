//! Driver tunables, loaded from the daemon's `[driver]` table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverSettings {
    /// Pause between service address polls.
    pub service_poll_interval_ms: u64,
    /// Inspections before address polling gives up.
    pub service_poll_attempts: u32,
    /// Submissions of one service update before a version conflict is fatal.
    pub update_attempts: u32,
    /// Grace period before a stopping container is killed.
    pub stop_grace_secs: u64,
    /// Delay before a log follower first reads a new container's output.
    pub log_delay_secs: u64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            service_poll_interval_ms: 5,
            service_poll_attempts: 10_000,
            update_attempts: 3,
            stop_grace_secs: 10,
            log_delay_secs: 5,
        }
    }
}

impl DriverSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.service_poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn log_delay(&self) -> Duration {
        Duration::from_secs(self.log_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = DriverSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_millis(5));
        assert_eq!(settings.service_poll_attempts, 10_000);
        assert_eq!(settings.update_attempts, 3);
        assert_eq!(settings.stop_grace(), Duration::from_secs(10));
        assert_eq!(settings.log_delay(), Duration::from_secs(5));
    }
}
