//! Connection registry and lifecycle control surface.
//!
//! The registry owns one entry per registered account. Each entry holds the
//! connection state, the reconnect counter, a cancellation token and the
//! command channel of the task that owns the account's session (see
//! [`super::actor`]). The entry map sits behind a synchronous mutex that is
//! only ever locked for single read-modify-write steps, never across an
//! `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::actor::{AccountTask, Command};
use super::config::SyncConfig;
use super::dedup::Persister;
use super::pipeline::SyncReport;
use super::status::{ConnectionStatus, StartReport, StatusReport};
use crate::account::{Account, AccountId, validate_account};
use crate::events::EventSink;
use crate::store::Gateway;
use crate::transport::Connector;
use crate::{Error, Result};

/// Per-account registry entry.
pub(crate) struct Entry {
    pub(crate) generation: u64,
    pub(crate) connected: bool,
    pub(crate) last_sync: DateTime<Utc>,
    pub(crate) reconnect_attempts: u32,
    pub(crate) disabled: bool,
    pub(crate) cancel: CancellationToken,
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) task: Option<JoinHandle<()>>,
}

impl Entry {
    fn status(&self) -> StatusReport {
        StatusReport {
            status: if self.connected {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Disconnected
            },
            last_sync: Some(self.last_sync),
            reconnect_attempts: self.reconnect_attempts,
        }
    }
}

/// State shared between the registry handle and the account tasks.
pub(crate) struct Shared {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) persister: Persister,
    pub(crate) config: SyncConfig,
    entries: Mutex<HashMap<AccountId, Entry>>,
    generations: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<AccountId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` to the entry for `id` if it still belongs to `generation`.
    pub(crate) fn update<R>(
        &self,
        id: &AccountId,
        generation: u64,
        f: impl FnOnce(&mut Entry) -> R,
    ) -> Option<R> {
        let mut entries = self.lock();
        entries
            .get_mut(id)
            .filter(|entry| entry.generation == generation)
            .map(f)
    }

    /// True if `id` is still registered under `generation` and not cancelled.
    pub(crate) fn is_current(&self, id: &AccountId, generation: u64) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|entry| entry.generation == generation && !entry.cancel.is_cancelled())
    }
}

/// Multi-account connection registry.
///
/// Cloning is cheap; clones share the same accounts.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        gateway: Arc<dyn Gateway>,
        events: EventSink,
        config: SyncConfig,
    ) -> Self {
        let persister = Persister::new(Arc::clone(&gateway), events);
        Self {
            shared: Arc::new(Shared {
                connector,
                gateway,
                persister,
                config,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Registers an account and starts synchronizing it.
    ///
    /// Any previous registration for the same ID is torn down first. Resolves
    /// once the first connection has completed its initial full sync, or with
    /// the first connection error. After a connection error the account stays
    /// registered and keeps retrying.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the account lacks IMAP credentials (nothing
    /// is registered), `Error::Transport` if the first attempt failed, or
    /// `Error::Cancelled` if the account was deregistered meanwhile.
    pub async fn register(&self, account: Account) -> Result<()> {
        validate_account(&account).map_err(Error::Config)?;

        let id = account.id.clone();
        if self.teardown(&id).await {
            debug!(account_id = %id, "Replaced previous registration");
        }

        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let entry = Entry {
            generation,
            connected: false,
            last_sync: Utc::now(),
            reconnect_attempts: 0,
            disabled: false,
            cancel: cancel.clone(),
            commands: commands_tx,
            task: None,
        };
        let raced = self.shared.lock().insert(id.clone(), entry);
        if let Some(previous) = raced {
            previous.cancel.cancel();
        }

        let task = AccountTask::new(
            account,
            generation,
            Arc::clone(&self.shared),
            cancel,
            commands_rx,
            ready_tx,
        );
        let handle = tokio::spawn(task.run());
        self.shared
            .update(&id, generation, move |entry| entry.task = Some(handle));

        info!(account_id = %id, "Account registered");

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Transport(e)),
            Err(_) => Err(Error::Cancelled(id)),
        }
    }

    /// Deregisters an account and closes its session.
    ///
    /// Returns false if the account was not registered.
    pub async fn deregister(&self, id: &AccountId) -> bool {
        let removed = self.teardown(id).await;
        if removed {
            info!(account_id = %id, "Account deregistered");
        }
        removed
    }

    /// Runs a full sync of every folder and records the sync time.
    ///
    /// Reconnects first if the account is between connections.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccountNotFound` or `Error::AccountDisabled` for
    /// accounts that cannot sync, the transport error if the sync failed, or
    /// `Error::Persist` if the sync time could not be recorded.
    pub async fn sync_now(&self, id: &AccountId) -> Result<SyncReport> {
        let commands = {
            let entries = self.shared.lock();
            let entry = entries
                .get(id)
                .ok_or_else(|| Error::AccountNotFound(id.clone()))?;
            if entry.disabled {
                return Err(Error::AccountDisabled(id.clone()));
            }
            entry.commands.clone()
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if commands.send(Command::SyncNow(reply_tx)).is_err() {
            return Err(self.unavailable(id));
        }
        let report = match reply_rx.await {
            Ok(result) => result?,
            Err(_) => return Err(self.unavailable(id)),
        };

        self.shared.gateway.update_last_sync(id, Utc::now()).await?;
        info!(account_id = %id, saved = report.saved(), "Manual sync complete");
        Ok(report)
    }

    /// Status of one account; unknown IDs report `not_configured`.
    #[must_use]
    pub fn status(&self, id: &AccountId) -> StatusReport {
        self.shared
            .lock()
            .get(id)
            .map_or_else(StatusReport::not_configured, Entry::status)
    }

    /// Status of every registered account.
    #[must_use]
    pub fn status_all(&self) -> BTreeMap<AccountId, StatusReport> {
        self.shared
            .lock()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.status()))
            .collect()
    }

    /// Registers every enabled account from the gateway.
    ///
    /// Accounts start concurrently; a failure is logged and recorded without
    /// affecting the others.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persist` if the accounts cannot be listed.
    pub async fn start_all(&self) -> Result<StartReport> {
        let accounts = self.shared.gateway.find_enabled_accounts().await?;
        if accounts.is_empty() {
            info!("No enabled accounts to start");
            return Ok(StartReport::default());
        }

        info!(count = accounts.len(), "Starting accounts");
        let results = join_all(accounts.into_iter().map(|account| async move {
            let id = account.id.clone();
            (id, self.register(account).await)
        }))
        .await;

        let mut report = StartReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.started.push(id),
                Err(e) => {
                    warn!(account_id = %id, error = %e, "Account failed to start");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Closes every session and clears all state.
    pub async fn stop_all(&self) {
        let entries: Vec<Entry> = self.shared.lock().drain().map(|(_, entry)| entry).collect();
        if entries.is_empty() {
            return;
        }

        let count = entries.len();
        for entry in &entries {
            entry.cancel.cancel();
        }
        for entry in entries {
            if let Some(task) = entry.task
                && let Err(e) = task.await
            {
                warn!(error = %e, "Account task ended abnormally");
            }
        }
        info!(count, "All accounts stopped");
    }

    /// Removes the entry for `id`, cancels it and waits for its task.
    async fn teardown(&self, id: &AccountId) -> bool {
        let removed = self.shared.lock().remove(id);
        let Some(entry) = removed else {
            return false;
        };

        entry.cancel.cancel();
        if let Some(task) = entry.task
            && let Err(e) = task.await
        {
            warn!(account_id = %id, error = %e, "Account task ended abnormally");
        }
        true
    }

    /// Error for a request whose task went away.
    fn unavailable(&self, id: &AccountId) -> Error {
        match self.shared.lock().get(id) {
            None => Error::AccountNotFound(id.clone()),
            Some(entry) if entry.disabled => Error::AccountDisabled(id.clone()),
            Some(_) => Error::Cancelled(id.clone()),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("accounts", &self.shared.lock().len())
            .field("config", &self.shared.config)
            .finish()
    }
}
