//! Folder synchronization pipeline.
//!
//! For one folder: open it, search the look-back window, fetch the matches
//! in fixed-size batches over the single session, parse each message and
//! hand the batch to the [`Persister`]. Batches run strictly one after the
//! other.

use chrono::{Days, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::config::SyncConfig;
use super::dedup::Persister;
use crate::account::{Account, AccountId};
use crate::message::parse_message;
use crate::transport::{MailSession, TransportResult};

/// Counters for one folder run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderReport {
    /// Folder name.
    pub folder: String,
    /// UIDs matched by the search.
    pub found: usize,
    /// Fetch round trips issued.
    pub batches: usize,
    /// Messages parsed successfully.
    pub parsed: usize,
    /// Messages skipped because they could not be parsed.
    pub parse_failures: usize,
    /// Messages stored for the first time.
    pub saved: usize,
    /// Messages skipped as already stored.
    pub duplicates: usize,
    /// Batches whose fetch failed without losing the connection.
    pub failed_batches: usize,
    /// Batches cut short by a persist failure.
    pub aborted_batches: usize,
}

/// Outcome of synchronizing every folder of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Folders that completed.
    pub folders: Vec<FolderReport>,
    /// Folders that failed, with the reason.
    pub failed_folders: Vec<(String, String)>,
}

impl SyncReport {
    /// Messages stored across all folders.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.folders.iter().map(|f| f.saved).sum()
    }

    /// Messages skipped as duplicates across all folders.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.folders.iter().map(|f| f.duplicates).sum()
    }

    /// Parse failures across all folders.
    #[must_use]
    pub fn parse_failures(&self) -> usize {
        self.folders.iter().map(|f| f.parse_failures).sum()
    }
}

/// Start of the search window, `lookback_days` before today.
#[must_use]
pub fn search_since(lookback_days: u32) -> NaiveDate {
    let today = Utc::now().date_naive();
    today
        .checked_sub_days(Days::new(u64::from(lookback_days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Splits ascending UIDs into fetch batches of at most `size`.
pub fn batches(uids: &[u32], size: usize) -> std::slice::Chunks<'_, u32> {
    uids.chunks(size.max(1))
}

/// Synchronizes one folder.
///
/// # Errors
///
/// Returns the transport error if the folder cannot be opened or searched,
/// or if the connection is lost while fetching. A fetch failure that leaves
/// the connection usable only skips that batch.
pub async fn sync_folder(
    session: &mut dyn MailSession,
    account_id: &AccountId,
    folder: &str,
    config: &SyncConfig,
    persister: &Persister,
) -> TransportResult<FolderReport> {
    let mut report = FolderReport {
        folder: folder.to_string(),
        ..FolderReport::default()
    };

    session.open_folder(folder, true).await?;

    let since = search_since(config.lookback_days);
    let uids = session.search_since(since).await?;
    report.found = uids.len();
    if uids.is_empty() {
        debug!(%account_id, folder, %since, "No messages in window");
        return Ok(report);
    }

    for batch in batches(&uids, config.batch_size) {
        report.batches += 1;
        let raw = match session.fetch(batch).await {
            Ok(raw) => raw,
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(e) => {
                warn!(%account_id, folder, first_uid = batch[0], error = %e, "Fetch failed, skipping batch");
                report.failed_batches += 1;
                continue;
            }
        };

        let mut messages = Vec::with_capacity(raw.len());
        for item in raw {
            match parse_message(&item.body) {
                Ok(parsed) => {
                    report.parsed += 1;
                    messages.push(parsed.into_message(account_id, folder, item.uid, item.size));
                }
                Err(e) => {
                    warn!(%account_id, folder, uid = item.uid, error = %e, "Skipping unparseable message");
                    report.parse_failures += 1;
                }
            }
        }

        let outcome = persister.persist_batch(messages).await;
        report.saved += outcome.saved;
        report.duplicates += outcome.duplicates;
        if outcome.aborted {
            report.aborted_batches += 1;
        }
    }

    info!(
        %account_id,
        folder,
        found = report.found,
        saved = report.saved,
        duplicates = report.duplicates,
        parse_failures = report.parse_failures,
        "Folder synchronized"
    );
    Ok(report)
}

/// Synchronizes every folder of `account`, in order.
///
/// A folder that fails is logged and recorded; the others still run.
///
/// # Errors
///
/// Returns the first error that lost the connection, which ends the run.
pub async fn sync_all_folders(
    session: &mut dyn MailSession,
    account: &Account,
    config: &SyncConfig,
    persister: &Persister,
) -> TransportResult<SyncReport> {
    let mut report = SyncReport::default();

    for folder in account.sync_folders() {
        match sync_folder(session, &account.id, &folder, config, persister).await {
            Ok(folder_report) => report.folders.push(folder_report),
            Err(e) if e.is_connection_lost() => {
                warn!(account_id = %account.id, %folder, error = %e, "Connection lost during sync");
                return Err(e);
            }
            Err(e) => {
                warn!(account_id = %account.id, %folder, error = %e, "Folder sync failed");
                report.failed_folders.push((folder, e.to_string()));
            }
        }
    }

    Ok(report)
}
