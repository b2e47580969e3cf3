//! IMAP-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use mailsync_imap::{Config, Security, Session};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ChangeSignal, Connector, MailSession, RawMessage, TransportError, TransportResult};
use crate::account::Account;
use crate::sync::SyncConfig;

/// Connector that opens real IMAP sessions.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl ImapConnector {
    /// Creates a connector using the timeouts from `config`.
    #[must_use]
    pub const fn new(config: &SyncConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            command_timeout: config.command_timeout,
        }
    }
}

impl Default for ImapConnector {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

#[async_trait]
impl Connector for ImapConnector {
    async fn connect(&self, account: &Account) -> TransportResult<Box<dyn MailSession>> {
        let imap = account
            .imap
            .as_ref()
            .ok_or_else(|| TransportError::Auth("account has no IMAP settings".into()))?;

        let config = Config::builder(&imap.host)
            .port(imap.port)
            .security(Security::from_secure(imap.secure))
            .credentials(&imap.username, &imap.password)
            .connect_timeout(self.connect_timeout)
            .command_timeout(self.command_timeout)
            .build();

        debug!(account_id = %account.id, address = %config.address(), "Opening IMAP session");
        let session = Session::connect(&config).await.map_err(connect_error)?;
        Ok(Box::new(ImapSession {
            inner: Some(session),
        }))
    }
}

/// Adapter from [`mailsync_imap::Session`] to [`MailSession`].
struct ImapSession {
    inner: Option<Session>,
}

impl ImapSession {
    fn session(&mut self) -> TransportResult<&mut Session> {
        self.inner
            .as_mut()
            .ok_or_else(|| TransportError::Closed("session already logged out".into()))
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn open_folder(&mut self, folder: &str, read_only: bool) -> TransportResult<u32> {
        self.session()?
            .open_folder(folder, read_only)
            .await
            .map_err(session_error)
    }

    async fn search_since(&mut self, since: NaiveDate) -> TransportResult<Vec<u32>> {
        self.session()?.search_since(since).await.map_err(session_error)
    }

    async fn fetch(&mut self, uids: &[u32]) -> TransportResult<Vec<RawMessage>> {
        self.session()?.fetch_raw(uids).await.map_err(session_error)
    }

    async fn wait_for_change(
        &mut self,
        timeout: Duration,
        interrupt: &CancellationToken,
    ) -> TransportResult<ChangeSignal> {
        self.session()?
            .wait_for_change(timeout, interrupt)
            .await
            .map_err(session_error)
    }

    async fn logout(&mut self) -> TransportResult<()> {
        match self.inner.take() {
            Some(session) => session.logout().await.map_err(session_error),
            None => Ok(()),
        }
    }
}

/// Maps an error raised while connecting or logging in.
fn connect_error(err: mailsync_imap::Error) -> TransportError {
    match err {
        mailsync_imap::Error::Auth(text) => TransportError::Auth(text),
        mailsync_imap::Error::Timeout { operation, after } => {
            TransportError::Timeout { operation, after }
        }
        other => TransportError::Connect(other.to_string()),
    }
}

/// Maps an error raised by a command on an established session.
fn session_error(err: mailsync_imap::Error) -> TransportError {
    if let mailsync_imap::Error::Timeout { operation, after } = err {
        return TransportError::Timeout { operation, after };
    }
    if err.is_graceful_close() {
        TransportError::Closed(err.to_string())
    } else if err.is_connection_lost() {
        TransportError::Io(err.to_string())
    } else {
        TransportError::Command(err.to_string())
    }
}
