//! Synchronization tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::account::DEFAULT_FOLDER;

/// Ceilings, delays, batch sizes and timeouts used by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Reconnects allowed after consecutive failures before the account is
    /// disabled.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnect.
    #[serde(with = "secs")]
    pub reconnect_delay: Duration,
    /// UIDs fetched per `UID FETCH` round trip.
    pub batch_size: usize,
    /// How far back `SEARCH SINCE` looks, in days.
    pub lookback_days: u32,
    /// Bound on connect and login.
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Bound on each command.
    #[serde(with = "secs")]
    pub command_timeout: Duration,
    /// Length of one IDLE wait before it is re-issued.
    #[serde(with = "secs")]
    pub idle_timeout: Duration,
    /// Folder watched with IDLE.
    pub primary_folder: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(5),
            batch_size: 10,
            lookback_days: 30,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(25 * 60),
            primary_folder: DEFAULT_FOLDER.to_string(),
        }
    }
}

impl SyncConfig {
    /// Sets the reconnect ceiling.
    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the reconnect delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the fetch batch size. Zero is treated as one.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the search look-back window.
    #[must_use]
    pub const fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the IDLE wait length.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the watched folder.
    #[must_use]
    pub fn with_primary_folder(mut self, folder: impl Into<String>) -> Self {
        self.primary_folder = folder.into();
        self
    }
}

/// Serde helper storing a `Duration` as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
