//! Connection status reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Connection state of one account as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The account is not registered.
    NotConfigured,
    /// A session is open.
    Connected,
    /// Registered, but no session is open right now.
    Disconnected,
}

/// Status snapshot for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Connection state.
    pub status: ConnectionStatus,
    /// Registration time, refreshed after each completed full sync.
    pub last_sync: Option<DateTime<Utc>>,
    /// Consecutive failed connection attempts.
    pub reconnect_attempts: u32,
}

impl StatusReport {
    /// Report for an account the registry does not know.
    #[must_use]
    pub const fn not_configured() -> Self {
        Self {
            status: ConnectionStatus::NotConfigured,
            last_sync: None,
            reconnect_attempts: 0,
        }
    }
}

/// Result of [`Registry::start_all`](super::Registry::start_all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Accounts whose first connection and sync succeeded.
    pub started: Vec<AccountId>,
    /// Accounts that failed to start, with the reason. Those rejected for
    /// their configuration are not registered; the rest keep retrying.
    pub failed: Vec<(AccountId, String)>,
}
