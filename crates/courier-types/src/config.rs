//! Bot configuration.
//!
//! [`CourierConfig`] is loaded from `courier.toml` and controls the auth
//! directory, retry policy, and every periodic interval the daemon runs.
//! All durations are stored as whole seconds in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CourierError;

/// Top-level configuration for one bot instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Directory holding session credentials and all signal-channel files.
    pub auth_dir: PathBuf,
    /// Bound on gateway session establishment.
    #[serde(default = "defaults::open_timeout_secs")]
    pub open_timeout_secs: u64,
    /// Interval between health probes while the session is open.
    #[serde(default = "defaults::probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Interval between periodic contact reconciliation passes.
    #[serde(default = "defaults::reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Minimum spacing between reconciliation passes, regardless of caller.
    #[serde(default = "defaults::reconcile_cooldown_secs")]
    pub reconcile_cooldown_secs: u64,
    /// Interval between polls of the outbound-request slot.
    #[serde(default = "defaults::outbound_poll_secs")]
    pub outbound_poll_secs: u64,
    /// Outbound requests older than this are discarded unsent.
    #[serde(default = "defaults::outbound_stale_secs")]
    pub outbound_stale_secs: u64,
    /// Consecutive failed reconnect attempts before the long cooldown.
    #[serde(default = "defaults::retry_ceiling")]
    pub retry_ceiling: u32,
    /// Reconnect delay once the retry ceiling is reached.
    #[serde(default = "defaults::retry_cooldown_secs")]
    pub retry_cooldown_secs: u64,
    /// An instance lock younger than this marks a live duplicate.
    #[serde(default = "defaults::lock_stale_secs")]
    pub lock_stale_secs: u64,
    /// How often the running instance refreshes its lock.
    #[serde(default = "defaults::lock_refresh_secs")]
    pub lock_refresh_secs: u64,
}

mod defaults {
    pub fn open_timeout_secs() -> u64 {
        60
    }
    pub fn probe_interval_secs() -> u64 {
        30
    }
    pub fn reconcile_interval_secs() -> u64 {
        30 * 60
    }
    pub fn reconcile_cooldown_secs() -> u64 {
        15 * 60
    }
    pub fn outbound_poll_secs() -> u64 {
        5
    }
    pub fn outbound_stale_secs() -> u64 {
        5 * 60
    }
    pub fn retry_ceiling() -> u32 {
        5
    }
    pub fn retry_cooldown_secs() -> u64 {
        5 * 60
    }
    pub fn lock_stale_secs() -> u64 {
        60
    }
    pub fn lock_refresh_secs() -> u64 {
        30
    }
}

impl CourierConfig {
    /// Default configuration rooted at the given auth directory.
    pub fn default_for(auth_dir: impl Into<PathBuf>) -> Self {
        Self {
            auth_dir: auth_dir.into(),
            open_timeout_secs: defaults::open_timeout_secs(),
            probe_interval_secs: defaults::probe_interval_secs(),
            reconcile_interval_secs: defaults::reconcile_interval_secs(),
            reconcile_cooldown_secs: defaults::reconcile_cooldown_secs(),
            outbound_poll_secs: defaults::outbound_poll_secs(),
            outbound_stale_secs: defaults::outbound_stale_secs(),
            retry_ceiling: defaults::retry_ceiling(),
            retry_cooldown_secs: defaults::retry_cooldown_secs(),
            lock_stale_secs: defaults::lock_stale_secs(),
            lock_refresh_secs: defaults::lock_refresh_secs(),
        }
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, CourierError> {
        toml::from_str(content).map_err(|e| CourierError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, CourierError> {
        toml::to_string_pretty(self).map_err(|e| CourierError::Config(e.to_string()))
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self, CourierError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CourierError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject intervals that would hammer the gateway or starve the poller.
    pub fn validate(&self) -> Result<(), CourierError> {
        if self.outbound_poll_secs < 5 || self.outbound_poll_secs > 10 {
            return Err(CourierError::Config(format!(
                "outbound_poll_secs must be within 5..=10, got {}",
                self.outbound_poll_secs
            )));
        }
        if self.probe_interval_secs == 0 {
            return Err(CourierError::Config(
                "probe_interval_secs must be non-zero".into(),
            ));
        }
        if self.lock_refresh_secs >= self.lock_stale_secs {
            return Err(CourierError::Config(format!(
                "lock_refresh_secs ({}) must be below lock_stale_secs ({})",
                self.lock_refresh_secs, self.lock_stale_secs
            )));
        }
        Ok(())
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn reconcile_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconcile_cooldown_secs)
    }

    pub fn outbound_poll(&self) -> Duration {
        Duration::from_secs(self.outbound_poll_secs)
    }

    pub fn outbound_stale(&self) -> Duration {
        Duration::from_secs(self.outbound_stale_secs)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }

    pub fn lock_stale(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }

    pub fn lock_refresh(&self) -> Duration {
        Duration::from_secs(self.lock_refresh_secs)
    }
}
