//! Account model types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Folder synchronized when an account lists none.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Unique identifier for an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Mail provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Generic IMAP server.
    #[default]
    Imap,
    /// Google Mail.
    Gmail,
    /// Microsoft Exchange.
    Exchange,
    /// Send-only SMTP relay.
    Smtp,
}

impl Provider {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Gmail => "gmail",
            Self::Exchange => "exchange",
            Self::Smtp => "smtp",
        }
    }

    /// Parses the storage representation, falling back to `Imap`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "gmail" => Self::Gmail,
            "exchange" => Self::Exchange,
            "smtp" => Self::Smtp,
            _ => Self::Imap,
        }
    }
}

/// IMAP server configuration.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connect with implicit TLS.
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
}

impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

const fn default_secure() -> bool {
    true
}

const fn default_enabled() -> bool {
    true
}

const fn default_sync_frequency() -> u32 {
    15
}

/// Email account as stored by the application.
///
/// The synchronizer treats accounts as read-only input; only `last_sync`
/// and `enabled` are written back, through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Provider kind.
    #[serde(default)]
    pub provider: Provider,
    /// Email address.
    pub email: String,
    /// Display name for the account.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Whether the account takes part in synchronization.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// IMAP configuration, required for synchronization.
    #[serde(default)]
    pub imap: Option<ImapConfig>,
    /// Folders to synchronize. Empty means `INBOX` only.
    #[serde(default)]
    pub folders: Vec<String>,
    /// Completion time of the last manual sync.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Full-sync interval used when the server cannot be monitored.
    #[serde(default = "default_sync_frequency")]
    pub sync_frequency_minutes: u32,
}

impl Account {
    /// Create an enabled IMAP account without server settings.
    #[must_use]
    pub fn new(id: impl Into<AccountId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: Provider::default(),
            email: email.into(),
            display_name: None,
            enabled: true,
            imap: None,
            folders: Vec::new(),
            last_sync: None,
            sync_frequency_minutes: default_sync_frequency(),
        }
    }

    /// Attach IMAP settings.
    #[must_use]
    pub fn with_imap(mut self, imap: ImapConfig) -> Self {
        self.imap = Some(imap);
        self
    }

    /// Replace the folder list.
    #[must_use]
    pub fn with_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.folders = folders.into_iter().map(Into::into).collect();
        self
    }

    /// Folders to synchronize, defaulting to `INBOX`.
    #[must_use]
    pub fn sync_folders(&self) -> Vec<String> {
        if self.folders.is_empty() {
            vec![DEFAULT_FOLDER.to_string()]
        } else {
            self.folders.clone()
        }
    }

    /// Interval between polling syncs, at least one minute.
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sync_frequency_minutes.max(1)) * 60)
    }
}
