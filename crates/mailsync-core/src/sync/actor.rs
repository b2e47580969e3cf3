//! Per-account session task.
//!
//! Each registered account gets one task that owns its session for the
//! whole registration: connect, initial full sync, IDLE monitoring on the
//! primary folder (or periodic polling where IDLE is unavailable), and the
//! reconnect loop. Commands arrive over a channel and are served between
//! waits, so the session only ever has one command in flight.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pipeline::{SyncReport, sync_all_folders, sync_folder};
use super::registry::Shared;
use crate::account::Account;
use crate::transport::{ChangeSignal, MailSession, TransportError, TransportResult};

type Reply = oneshot::Sender<TransportResult<SyncReport>>;

/// Requests sent from the registry to an account task.
pub(crate) enum Command {
    /// Run a full sync now and report the outcome.
    SyncNow(Reply),
}

/// How a session ended.
enum Cycle {
    /// Deregistered or shut down.
    Cancelled,
    /// The server closed the session.
    Ended(TransportError),
    /// Connecting or the session failed.
    Failed(TransportError),
}

impl Cycle {
    fn from_error(err: TransportError) -> Self {
        if err.is_end() {
            Self::Ended(err)
        } else {
            Self::Failed(err)
        }
    }
}

pub(crate) struct AccountTask {
    account: Account,
    generation: u64,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<Command>,
    ready: Option<oneshot::Sender<TransportResult<()>>>,
}

impl AccountTask {
    pub(crate) fn new(
        account: Account,
        generation: u64,
        shared: Arc<Shared>,
        cancel: CancellationToken,
        commands: mpsc::UnboundedReceiver<Command>,
        ready: oneshot::Sender<TransportResult<()>>,
    ) -> Self {
        Self {
            account,
            generation,
            shared,
            cancel,
            commands,
            ready: Some(ready),
        }
    }

    /// Runs sessions until cancelled or disabled.
    pub(crate) async fn run(mut self) {
        let id = self.account.id.clone();
        let generation = self.generation;
        let max = self.shared.config.max_reconnect_attempts;
        let mut pending = Vec::new();

        loop {
            match self.session_cycle(&mut pending).await {
                Cycle::Cancelled => break,
                Cycle::Ended(e) => {
                    self.shared
                        .update(&id, generation, |entry| entry.connected = false);
                    info!(account_id = %id, reason = %e, "Server closed session, reconnecting");
                }
                Cycle::Failed(e) => {
                    let state = self.shared.update(&id, generation, |entry| {
                        entry.connected = false;
                        entry.reconnect_attempts += 1;
                        if entry.reconnect_attempts > max {
                            entry.disabled = true;
                        }
                        (entry.reconnect_attempts, entry.disabled)
                    });
                    let Some((attempt, disabled)) = state else {
                        break;
                    };

                    if disabled {
                        error!(
                            account_id = %id,
                            attempt,
                            error = %e,
                            "Reconnect attempts exhausted, disabling account"
                        );
                        if let Err(e) = self.shared.gateway.disable_account(&id).await {
                            warn!(account_id = %id, error = %e, "Failed to disable account");
                        }
                        break;
                    }
                    warn!(account_id = %id, attempt, max, error = %e, "Connection failed, will retry");
                }
            }

            if !self.wait_before_reconnect(&mut pending).await {
                break;
            }
            if !self.shared.is_current(&id, generation) {
                debug!(account_id = %id, generation, "Registration replaced, not reconnecting");
                break;
            }
        }

        debug!(account_id = %id, generation, "Account task finished");
    }

    /// One connection from connect to its end.
    async fn session_cycle(&mut self, pending: &mut Vec<Reply>) -> Cycle {
        let shared = Arc::clone(&self.shared);
        let id = self.account.id.clone();

        debug!(account_id = %id, "Connecting");
        let mut session = match or_cancel(&self.cancel, shared.connector.connect(&self.account)).await
        {
            None => return Cycle::Cancelled,
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                self.settle(std::mem::take(pending), &Err(e.clone()));
                return Cycle::Failed(e);
            }
        };

        let current = shared.update(&id, self.generation, |entry| {
            entry.connected = true;
            entry.reconnect_attempts = 0;
        });
        if current.is_none() {
            close(session.as_mut(), &self.account).await;
            return Cycle::Cancelled;
        }
        info!(account_id = %id, "Connected");

        let synced = or_cancel(
            &self.cancel,
            sync_all_folders(session.as_mut(), &self.account, &shared.config, &shared.persister),
        )
        .await;
        let Some(result) = synced else {
            return Cycle::Cancelled;
        };
        self.settle(std::mem::take(pending), &result);

        let cycle = match result {
            Ok(_) => self.monitor(session.as_mut()).await,
            Err(e) => Cycle::from_error(e),
        };
        if let Cycle::Failed(e) = &cycle
            && !e.is_connection_lost()
        {
            close(session.as_mut(), &self.account).await;
        }
        cycle
    }

    /// Watches the primary folder with IDLE and serves commands.
    async fn monitor(&mut self, session: &mut dyn MailSession) -> Cycle {
        let shared = Arc::clone(&self.shared);
        let config = &shared.config;
        let id = self.account.id.clone();
        let folder = config.primary_folder.as_str();

        'arm: loop {
            match or_cancel(&self.cancel, session.open_folder(folder, false)).await {
                None => return Cycle::Cancelled,
                Some(Err(e)) if e.is_connection_lost() => return Cycle::from_error(e),
                Some(Err(e)) => {
                    warn!(account_id = %id, folder, error = %e, "Cannot monitor folder, polling instead");
                    return self.poll(session, None).await;
                }
                Some(Ok(exists)) => {
                    debug!(account_id = %id, folder, exists, "Monitoring folder");
                }
            }

            loop {
                let interrupt = self.cancel.child_token();
                let mut command = None;
                let mut detached = false;

                let signal = {
                    let wait = session.wait_for_change(config.idle_timeout, &interrupt);
                    tokio::pin!(wait);
                    loop {
                        tokio::select! {
                            biased;
                            received = self.commands.recv(), if !interrupt.is_cancelled() => {
                                match received {
                                    Some(c) => command = Some(c),
                                    None => detached = true,
                                }
                                interrupt.cancel();
                            }
                            result = &mut wait => break result,
                        }
                    }
                };

                let signal = match signal {
                    Ok(signal) => signal,
                    Err(e) if e.is_connection_lost() => return Cycle::from_error(e),
                    Err(e) if !detached => {
                        warn!(account_id = %id, folder, error = %e, "IDLE refused, polling instead");
                        return self.poll(session, command).await;
                    }
                    Err(_) => ChangeSignal::Interrupted,
                };
                if detached || self.cancel.is_cancelled() {
                    close(session, &self.account).await;
                    return Cycle::Cancelled;
                }

                if let Some(Command::SyncNow(reply)) = command {
                    debug!(account_id = %id, "Manual sync requested");
                    let synced = or_cancel(
                        &self.cancel,
                        sync_all_folders(session, &self.account, config, &shared.persister),
                    )
                    .await;
                    let Some(result) = synced else {
                        return Cycle::Cancelled;
                    };
                    self.settle(vec![reply], &result);
                    if let Err(e) = result {
                        return Cycle::from_error(e);
                    }
                    continue 'arm;
                }

                match signal {
                    ChangeSignal::Changed => {
                        info!(account_id = %id, folder, "New mail signalled");
                        let synced = or_cancel(
                            &self.cancel,
                            sync_folder(session, &id, folder, config, &shared.persister),
                        )
                        .await;
                        match synced {
                            None => return Cycle::Cancelled,
                            Some(Err(e)) if e.is_connection_lost() => {
                                return Cycle::from_error(e);
                            }
                            Some(Err(e)) => {
                                warn!(account_id = %id, folder, error = %e, "Incremental sync failed");
                            }
                            Some(Ok(_)) => {}
                        }
                        continue 'arm;
                    }
                    ChangeSignal::Timeout => {
                        debug!(account_id = %id, folder, "IDLE timed out, re-issuing");
                    }
                    ChangeSignal::Interrupted => {}
                }
            }
        }
    }

    /// Runs a full sync every `sync_frequency_minutes` on a session that
    /// cannot be monitored, serving commands in between. `pending` is served
    /// first.
    async fn poll(&mut self, session: &mut dyn MailSession, pending: Option<Command>) -> Cycle {
        let shared = Arc::clone(&self.shared);
        let id = self.account.id.clone();
        let period = self.account.sync_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(account_id = %id, ?period, "Polling for changes");

        let mut next = pending;
        loop {
            let command = match next.take() {
                Some(command) => Some(command),
                None => tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        close(session, &self.account).await;
                        return Cycle::Cancelled;
                    }
                    received = self.commands.recv() => match received {
                        Some(command) => Some(command),
                        None => {
                            close(session, &self.account).await;
                            return Cycle::Cancelled;
                        }
                    },
                    _ = ticker.tick() => None,
                },
            };

            let replies = match command {
                Some(Command::SyncNow(reply)) => {
                    debug!(account_id = %id, "Manual sync requested");
                    vec![reply]
                }
                None => {
                    debug!(account_id = %id, "Periodic sync");
                    Vec::new()
                }
            };
            let synced = or_cancel(
                &self.cancel,
                sync_all_folders(session, &self.account, &shared.config, &shared.persister),
            )
            .await;
            let Some(result) = synced else {
                return Cycle::Cancelled;
            };
            self.settle(replies, &result);
            if let Err(e) = result {
                return Cycle::from_error(e);
            }
        }
    }

    /// Waits the reconnect delay. A queued sync request cuts the wait
    /// short. Returns false if the task should stop.
    async fn wait_before_reconnect(&mut self, pending: &mut Vec<Reply>) -> bool {
        let delay = self.shared.config.reconnect_delay;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
            received = self.commands.recv() => match received {
                Some(Command::SyncNow(reply)) => {
                    pending.push(reply);
                    true
                }
                None => false,
            },
        }
    }

    /// Delivers a sync outcome to waiting callers.
    fn settle(&mut self, replies: Vec<Reply>, result: &TransportResult<SyncReport>) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(result.as_ref().map(|_| ()).map_err(Clone::clone));
        }
        for reply in replies {
            let _ = reply.send(result.clone());
        }
        if result.is_ok() {
            self.shared
                .update(&self.account.id, self.generation, |entry| {
                    entry.last_sync = Utc::now();
                });
        }
    }
}

/// Resolves `fut` unless `cancel` fires first.
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

async fn close(session: &mut dyn MailSession, account: &Account) {
    match session.logout().await {
        Ok(()) => debug!(account_id = %account.id, "Logged out"),
        Err(e) => debug!(account_id = %account.id, error = %e, "Logout failed"),
    }
}
