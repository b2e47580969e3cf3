//! Authenticated IMAP session.
//!
//! `Session` wraps an `async-imap` session over an [`ImapStream`] and exposes
//! the handful of commands a folder synchronizer needs: open a folder, search
//! by date, fetch raw messages by UID, wait for changes with IDLE and log out.
//! Every server round trip is bounded by a timeout taken from [`Config`].

use std::future::Future;
use std::time::Duration;

use async_imap::extensions::idle::IdleResponse;
use async_imap::types::UnsolicitedResponse;
use chrono::NaiveDate;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::query::{since_query, uid_set};
use crate::stream::{self, ImapStream};
use crate::{Error, Result};

type Inner = async_imap::Session<ImapStream>;

const FETCH_ITEMS: &str = "(UID RFC822.SIZE BODY.PEEK[])";

/// A message as returned by `UID FETCH`, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message UID within the folder.
    pub uid: u32,
    /// `RFC822.SIZE` reported by the server, or the body length.
    pub size: u32,
    /// Full RFC 5322 message bytes.
    pub body: Vec<u8>,
}

/// Result of waiting for mailbox changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSignal {
    /// The server pushed new mailbox data.
    Changed,
    /// The wait elapsed without server activity.
    Timeout,
    /// The caller interrupted the wait.
    Interrupted,
}

/// An authenticated IMAP session.
pub struct Session {
    inner: Option<Inner>,
    selected: Option<String>,
    command_timeout: Duration,
}

impl Session {
    /// Connects to the server and logs in.
    ///
    /// TCP connect, TLS handshake and `LOGIN` all share the configured
    /// connect timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the budget is exhausted, `Error::Auth` if
    /// the server rejects the credentials, or the underlying transport error.
    pub async fn connect(config: &Config) -> Result<Self> {
        let budget = config.connect_timeout;
        let inner = bounded("connect", budget, async {
            let stream = stream::connect(&config.host, config.port, config.security, budget).await?;
            let client = async_imap::Client::new(stream);
            client
                .login(&config.username, &config.password)
                .await
                .map_err(|(err, _client)| match err {
                    async_imap::error::Error::No(text) | async_imap::error::Error::Bad(text) => {
                        Error::Auth(text)
                    }
                    other => Error::Imap(other),
                })
        })
        .await?;

        info!(host = %config.host, user = %config.username, "IMAP session established");

        Ok(Self {
            inner: Some(inner),
            selected: None,
            command_timeout: config.command_timeout,
        })
    }

    /// Returns the currently open folder, if any.
    #[must_use]
    pub fn selected_folder(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Opens a folder with `EXAMINE` (read-only) or `SELECT` (read-write).
    ///
    /// Returns the folder's message count.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist or the command fails.
    pub async fn open_folder(&mut self, folder: &str, read_only: bool) -> Result<u32> {
        let limit = self.command_timeout;
        let inner = self.inner()?;
        let mailbox = if read_only {
            bounded("EXAMINE", limit, async { Ok(inner.examine(folder).await?) }).await?
        } else {
            bounded("SELECT", limit, async { Ok(inner.select(folder).await?) }).await?
        };
        self.selected = Some(folder.to_string());
        debug!(folder, read_only, exists = mailbox.exists, "Folder opened");
        Ok(mailbox.exists)
    }

    /// Runs `UID SEARCH SINCE <date>` in the open folder.
    ///
    /// Returns the matching UIDs in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if no folder is open or the command fails.
    pub async fn search_since(&mut self, date: NaiveDate) -> Result<Vec<u32>> {
        self.require_selected()?;
        let limit = self.command_timeout;
        let query = since_query(date);
        let inner = self.inner()?;
        let found = bounded("SEARCH", limit, async { Ok(inner.uid_search(&query).await?) }).await?;
        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// Fetches the given UIDs in one `UID FETCH` round trip.
    ///
    /// Responses without a UID are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if no folder is open or the command fails.
    pub async fn fetch_raw(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.require_selected()?;
        let limit = self.command_timeout;
        let set = uid_set(uids);
        let inner = self.inner()?;

        bounded("FETCH", limit, async {
            let responses = inner.uid_fetch(&set, FETCH_ITEMS).await?;
            futures::pin_mut!(responses);

            let mut messages = Vec::with_capacity(uids.len());
            while let Some(item) = responses.next().await {
                let fetch = item?;
                let Some(uid) = fetch.uid else {
                    continue;
                };
                let body = fetch.body().map(<[u8]>::to_vec).unwrap_or_default();
                let size = fetch
                    .size
                    .unwrap_or_else(|| u32::try_from(body.len()).unwrap_or(u32::MAX));
                messages.push(RawMessage { uid, size, body });
            }
            Ok(messages)
        })
        .await
    }

    /// Waits for changes in the open folder using `IDLE`.
    ///
    /// Returns when the server pushes data, `timeout` elapses, or `cancel`
    /// fires. The session leaves IDLE before returning in every case.
    ///
    /// # Errors
    ///
    /// Returns an error if no folder is open or the session breaks while
    /// idling. The session is unusable after an error.
    pub async fn wait_for_change(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ChangeSignal> {
        self.require_selected()?;
        if self.take_pending_exists() {
            return Ok(ChangeSignal::Changed);
        }

        let limit = self.command_timeout;
        let session = self
            .inner
            .take()
            .ok_or_else(|| Error::Closed("session is not open".into()))?;

        let mut handle = session.idle();
        bounded("IDLE", limit, async { Ok(handle.init().await?) }).await?;

        let response = {
            let (wait, stop) = handle.wait_with_timeout(timeout);
            tokio::pin!(wait);
            tokio::select! {
                response = &mut wait => response,
                () = cancel.cancelled() => {
                    drop(stop);
                    wait.await
                }
            }
        }?;

        let session = bounded("DONE", limit, async { Ok(handle.done().await?) }).await?;
        self.inner = Some(session);

        let signal = match response {
            IdleResponse::NewData(_) => ChangeSignal::Changed,
            IdleResponse::Timeout if self.take_pending_exists() => ChangeSignal::Changed,
            IdleResponse::Timeout => ChangeSignal::Timeout,
            IdleResponse::ManualInterrupt => ChangeSignal::Interrupted,
        };
        debug!(?signal, "IDLE finished");
        Ok(signal)
    }

    /// Logs out and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the `LOGOUT` command fails.
    pub async fn logout(mut self) -> Result<()> {
        let limit = self.command_timeout;
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };
        bounded("LOGOUT", limit, async { Ok(inner.logout().await?) }).await?;
        debug!("IMAP session logged out");
        Ok(())
    }

    fn inner(&mut self) -> Result<&mut Inner> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::Closed("session is not open".into()))
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected.is_none() {
            return Err(Error::InvalidState("no folder is open".into()));
        }
        Ok(())
    }

    /// Drains buffered unsolicited responses, reporting whether any announced
    /// a new message count.
    fn take_pending_exists(&mut self) -> bool {
        let Some(inner) = self.inner.as_mut() else {
            return false;
        };
        let mut exists = false;
        while let Ok(response) = inner.unsolicited_responses.try_recv() {
            match response {
                UnsolicitedResponse::Exists(count) => {
                    debug!(count, "Unsolicited EXISTS");
                    exists = true;
                }
                other => debug!(?other, "Ignoring unsolicited response"),
            }
        }
        exists
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.inner.is_some())
            .field("selected", &self.selected)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// Runs `fut` with a deadline, mapping expiry to [`Error::Timeout`].
async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Ok(result) = tokio::time::timeout(after, fut).await {
        result
    } else {
        warn!(operation, ?after, "IMAP operation timed out");
        Err(Error::Timeout { operation, after })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Security;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let err = bounded("SEARCH", Duration::from_secs(60), async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "SEARCH", .. }));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let value = bounded("NOOP", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_login_rejected_maps_to_auth_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"* OK IMAP4rev1 ready\r\n")
                .await
                .unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let line = String::from_utf8_lossy(&buf[..n]).to_string();
            let tag = line.split_whitespace().next().unwrap().to_string();
            socket
                .write_all(format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n").as_bytes())
                .await
                .unwrap();
        });

        let config = Config::builder("127.0.0.1")
            .port(port)
            .security(Security::Plain)
            .credentials("user", "wrong")
            .connect_timeout(Duration::from_secs(5))
            .build();

        let err = Session::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "got {err:?}");
        assert!(!err.is_connection_lost());
        server.await.unwrap();
    }
}
