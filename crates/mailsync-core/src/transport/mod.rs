//! Mail transport seam.
//!
//! The registry drives sessions through [`Connector`] and [`MailSession`] so
//! that the lifecycle logic does not depend on a concrete IMAP client.
//! [`ImapConnector`] is the production implementation.

mod imap;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::account::Account;

pub use imap::ImapConnector;
pub use mailsync_imap::{ChangeSignal, RawMessage};

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server could not be reached or the TLS handshake failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server rejected a command; the session is still usable.
    #[error("Command failed: {0}")]
    Command(String),

    /// An operation exceeded its time bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that did not complete.
        operation: &'static str,
        /// The configured bound.
        after: Duration,
    },

    /// The connection broke mid-session.
    #[error("Connection lost: {0}")]
    Io(String),

    /// The server ended the session (BYE or end of stream).
    #[error("Connection closed by server: {0}")]
    Closed(String),
}

impl TransportError {
    /// Returns true if the session cannot be used after this error.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout { .. } | Self::Io(_) | Self::Closed(_)
        )
    }

    /// Returns true if the server closed the session on its own terms.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Opens authenticated sessions for accounts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects and logs in with the account's IMAP settings.
    async fn connect(&self, account: &Account) -> TransportResult<Box<dyn MailSession>>;
}

/// An authenticated session owned by exactly one account task.
#[async_trait]
pub trait MailSession: Send {
    /// Opens `folder`, read-only (`EXAMINE`) or read-write (`SELECT`).
    /// Returns the message count.
    async fn open_folder(&mut self, folder: &str, read_only: bool) -> TransportResult<u32>;

    /// UIDs of messages received on or after `since`, ascending.
    async fn search_since(&mut self, since: NaiveDate) -> TransportResult<Vec<u32>>;

    /// Fetches full raw messages for `uids` in one round trip.
    async fn fetch(&mut self, uids: &[u32]) -> TransportResult<Vec<RawMessage>>;

    /// Waits for a change in the open folder, at most `timeout`, returning
    /// early with [`ChangeSignal::Interrupted`] once `interrupt` fires.
    async fn wait_for_change(
        &mut self,
        timeout: Duration,
        interrupt: &CancellationToken,
    ) -> TransportResult<ChangeSignal>;

    /// Closes the session politely.
    async fn logout(&mut self) -> TransportResult<()>;
}
