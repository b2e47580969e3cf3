//! Scripted transport and in-memory gateway shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use mailsync_core::transport::{ChangeSignal, RawMessage};
use mailsync_core::{
    Account, AccountId, Connector, Gateway, ImapConfig, MailSession, Message, StoreError,
    StoreResult, TransportError, TransportResult,
};

/// Builds a minimal RFC 5322 message.
pub fn raw_message(message_id: &str, subject: &str) -> Vec<u8> {
    format!(
        "Message-ID: <{message_id}>\r\n\
         From: Alice <alice@example.com>\r\n\
         To: bob@example.com\r\n\
         Subject: {subject}\r\n\
         Date: Mon, 12 Oct 2026 09:00:00 +0000\r\n\
         \r\n\
         Hello from {subject}\r\n"
    )
    .into_bytes()
}

/// An enabled account with complete IMAP settings.
pub fn imap_account(id: &str) -> Account {
    Account::new(id, format!("{id}@example.com")).with_imap(ImapConfig {
        host: "imap.example.com".into(),
        port: 993,
        secure: true,
        username: format!("{id}@example.com"),
        password: "secret".into(),
    })
}

/// Polls `condition` until it holds, failing the test after a while.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..6000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Mailbox state and call log for one scripted server.
#[derive(Default)]
pub struct Server {
    folders: Mutex<HashMap<String, BTreeMap<u32, Vec<u8>>>>,
    open_errors: Mutex<HashMap<String, TransportError>>,
    fetch_errors: Mutex<HashMap<(String, u32), TransportError>>,
    idle_error: Mutex<Option<TransportError>>,
    failing_connects: AtomicUsize,
    refuse_all: AtomicBool,
    /// Successful and failed connect attempts.
    pub connects: AtomicUsize,
    /// Logouts received.
    pub logouts: AtomicUsize,
    /// IDLE waits started.
    pub idles: AtomicUsize,
    /// `(folder, read_only)` for every folder open.
    pub opens: Mutex<Vec<(String, bool)>>,
    /// UID sets requested by every fetch.
    pub fetches: Mutex<Vec<Vec<u32>>>,
    new_mail: Notify,
    hangup: Notify,
}

impl Server {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores `raw` under `uid` in `folder`.
    pub fn deliver(&self, folder: &str, uid: u32, raw: Vec<u8>) {
        self.folders
            .lock()
            .unwrap()
            .entry(folder.to_string())
            .or_default()
            .insert(uid, raw);
    }

    /// Fills `folder` with `count` distinct messages, UIDs starting at 1.
    pub fn fill(&self, folder: &str, count: u32) {
        for uid in 1..=count {
            let id = format!("{folder}.{uid}@example.com");
            self.deliver(folder, uid, raw_message(&id, &format!("message {uid}")));
        }
    }

    pub fn fail_open(&self, folder: &str, err: TransportError) {
        self.open_errors.lock().unwrap().insert(folder.to_string(), err);
    }

    /// Fails the next fetch of `folder` whose first UID is `first_uid`.
    pub fn fail_fetch(&self, folder: &str, first_uid: u32, err: TransportError) {
        self.fetch_errors
            .lock()
            .unwrap()
            .insert((folder.to_string(), first_uid), err);
    }

    /// Rejects every IDLE with `err`.
    pub fn refuse_idle(&self, err: TransportError) {
        *self.idle_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn refuse_connections(&self) {
        self.refuse_all.store(true, Ordering::SeqCst);
    }

    /// Pushes a new-mail signal to the current or next IDLE wait.
    pub fn signal_new_mail(&self) {
        self.new_mail.notify_one();
    }

    /// Ends the current or next IDLE wait with a server BYE.
    pub fn hang_up(&self) {
        self.hangup.notify_one();
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.idles.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn fetch_sizes(&self) -> Vec<usize> {
        self.fetches.lock().unwrap().iter().map(Vec::len).collect()
    }

    fn try_connect(&self) -> TransportResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_all.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("connection refused".into()));
        }
        Ok(())
    }
}

/// Connector routing each account to its scripted server.
#[derive(Default)]
pub struct ScriptedConnector {
    servers: HashMap<AccountId, Arc<Server>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, account_id: &str, server: &Arc<Server>) -> Self {
        self.servers.insert(AccountId::new(account_id), Arc::clone(server));
        self
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, account: &Account) -> TransportResult<Box<dyn MailSession>> {
        let server = self
            .servers
            .get(&account.id)
            .ok_or_else(|| TransportError::Connect(format!("no route to {}", account.id)))?;
        server.try_connect()?;
        Ok(Box::new(ScriptedSession {
            server: Arc::clone(server),
            folder: None,
        }))
    }
}

/// Session over a scripted server.
pub struct ScriptedSession {
    server: Arc<Server>,
    folder: Option<String>,
}

impl ScriptedSession {
    fn folder(&self) -> TransportResult<&str> {
        self.folder
            .as_deref()
            .ok_or_else(|| TransportError::Command("no folder selected".into()))
    }
}

#[async_trait]
impl MailSession for ScriptedSession {
    async fn open_folder(&mut self, folder: &str, read_only: bool) -> TransportResult<u32> {
        self.server
            .opens
            .lock()
            .unwrap()
            .push((folder.to_string(), read_only));
        if let Some(err) = self.server.open_errors.lock().unwrap().get(folder) {
            return Err(err.clone());
        }
        self.folder = Some(folder.to_string());
        let folders = self.server.folders.lock().unwrap();
        Ok(folders
            .get(folder)
            .map_or(0, |messages| u32::try_from(messages.len()).unwrap()))
    }

    async fn search_since(&mut self, _since: NaiveDate) -> TransportResult<Vec<u32>> {
        let folder = self.folder()?;
        let folders = self.server.folders.lock().unwrap();
        Ok(folders
            .get(folder)
            .map(|messages| messages.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn fetch(&mut self, uids: &[u32]) -> TransportResult<Vec<RawMessage>> {
        let folder = self.folder()?.to_string();
        self.server.fetches.lock().unwrap().push(uids.to_vec());
        let injected = self
            .server
            .fetch_errors
            .lock()
            .unwrap()
            .remove(&(folder.clone(), uids[0]));
        if let Some(err) = injected {
            return Err(err);
        }

        let folders = self.server.folders.lock().unwrap();
        let messages = folders.get(&folder);
        Ok(uids
            .iter()
            .filter_map(|uid| {
                messages.and_then(|m| m.get(uid)).map(|body| RawMessage {
                    uid: *uid,
                    size: u32::try_from(body.len()).unwrap(),
                    body: body.clone(),
                })
            })
            .collect())
    }

    async fn wait_for_change(
        &mut self,
        timeout: Duration,
        interrupt: &CancellationToken,
    ) -> TransportResult<ChangeSignal> {
        self.server.idles.fetch_add(1, Ordering::SeqCst);
        let refused = self.server.idle_error.lock().unwrap().clone();
        if let Some(err) = refused {
            return Err(err);
        }
        tokio::select! {
            biased;
            () = interrupt.cancelled() => Ok(ChangeSignal::Interrupted),
            () = self.server.hangup.notified() => Err(TransportError::Closed("BYE".into())),
            () = self.server.new_mail.notified() => Ok(ChangeSignal::Changed),
            () = tokio::time::sleep(timeout) => Ok(ChangeSignal::Timeout),
        }
    }

    async fn logout(&mut self) -> TransportResult<()> {
        self.server.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Gateway keeping everything in memory, with failure injection.
#[derive(Default)]
pub struct MemoryGateway {
    accounts: Mutex<Vec<Account>>,
    messages: Mutex<Vec<Message>>,
    /// Accounts passed to `disable_account`, in call order.
    pub disabled: Mutex<Vec<AccountId>>,
    /// `update_last_sync` calls.
    pub last_syncs: Mutex<Vec<(AccountId, DateTime<Utc>)>>,
    failing_saves: Mutex<HashSet<String>>,
    blind_lookups: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_account(&self, account: Account) {
        self.accounts.lock().unwrap().push(account);
    }

    /// Stores a message without going through the pipeline.
    pub fn preload(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    /// Makes `save` fail for `message_id` with a non-duplicate error.
    pub fn fail_save(&self, message_id: &str) {
        self.failing_saves
            .lock()
            .unwrap()
            .insert(message_id.to_string());
    }

    /// Makes both lookups report nothing, leaving only `save` to detect
    /// duplicates.
    pub fn blind_lookups(&self) {
        self.blind_lookups.store(true, Ordering::SeqCst);
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages_for(&self, account_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.account_id.as_str() == account_id)
            .cloned()
            .collect()
    }

    pub fn disabled_count(&self) -> usize {
        self.disabled.lock().unwrap().len()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn find_existing(&self, message_id: &str, account_id: &AccountId) -> StoreResult<bool> {
        if self.blind_lookups.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.message_id == message_id && &m.account_id == account_id))
    }

    async fn find_existing_global(&self, message_id: &str) -> StoreResult<Option<AccountId>> {
        if self.blind_lookups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.message_id == message_id)
            .map(|m| m.account_id.clone()))
    }

    async fn save(&self, message: &Message) -> StoreResult<()> {
        if self.failing_saves.lock().unwrap().contains(&message.message_id) {
            return Err(StoreError::InvalidData("disk full".into()));
        }
        let mut messages = self.messages.lock().unwrap();
        if messages.iter().any(|m| m.message_id == message.message_id) {
            return Err(StoreError::Duplicate {
                message_id: message.message_id.clone(),
            });
        }
        messages.push(message.clone());
        Ok(())
    }

    async fn update_last_sync(&self, account_id: &AccountId, at: DateTime<Utc>) -> StoreResult<()> {
        self.last_syncs
            .lock()
            .unwrap()
            .push((account_id.clone(), at));
        Ok(())
    }

    async fn disable_account(&self, account_id: &AccountId) -> StoreResult<()> {
        self.disabled.lock().unwrap().push(account_id.clone());
        for account in self.accounts.lock().unwrap().iter_mut() {
            if &account.id == account_id {
                account.enabled = false;
            }
        }
        Ok(())
    }

    async fn find_enabled_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.enabled)
            .cloned()
            .collect())
    }
}
