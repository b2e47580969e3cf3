//! Integration tests for the folder pipeline.
//!
//! These drive `sync_folder` and `sync_all_folders` against a scripted
//! session, without a registry or account task in between.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use common::{MemoryGateway, ScriptedConnector, Server, imap_account, raw_message};
use mailsync_core::events::{self, EventReceiver};
use mailsync_core::message::parse_message;
use mailsync_core::sync::{Persister, sync_all_folders, sync_folder};
use mailsync_core::{
    AccountId, Connector, Gateway, MailSession, SqliteGateway, SyncConfig, TransportError,
};

async fn session_for(server: &Arc<Server>, account_id: &str) -> Box<dyn MailSession> {
    ScriptedConnector::new()
        .with(account_id, server)
        .connect(&imap_account(account_id))
        .await
        .unwrap()
}

fn drain(rx: &mut EventReceiver) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

#[tokio::test]
async fn unparseable_message_only_costs_itself() {
    let server = Server::new();
    server.fill("INBOX", 25);
    server.deliver("INBOX", 15, Vec::new());

    let gateway = Arc::new(SqliteGateway::in_memory().await.unwrap());
    let (sink, mut rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let mut session = session_for(&server, "acct-1").await;

    let report = sync_folder(
        session.as_mut(),
        &AccountId::new("acct-1"),
        "INBOX",
        &SyncConfig::default(),
        &persister,
    )
    .await
    .unwrap();

    assert_eq!(server.fetch_sizes(), vec![10, 10, 5]);
    assert_eq!(report.found, 25);
    assert_eq!(report.batches, 3);
    assert_eq!(report.parse_failures, 1);
    assert_eq!(report.saved, 24);
    assert_eq!(gateway.count_messages(None).await.unwrap(), 24);
    assert_eq!(drain(&mut rx), 24);
}

#[tokio::test]
async fn second_sync_stores_nothing_new() {
    let server = Server::new();
    server.fill("INBOX", 12);

    let gateway = Arc::new(SqliteGateway::in_memory().await.unwrap());
    let (sink, mut rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let account = imap_account("acct-1");
    let mut session = session_for(&server, "acct-1").await;
    let config = SyncConfig::default();

    let first = sync_all_folders(session.as_mut(), &account, &config, &persister)
        .await
        .unwrap();
    let second = sync_all_folders(session.as_mut(), &account, &config, &persister)
        .await
        .unwrap();

    assert_eq!(first.saved(), 12);
    assert_eq!(second.saved(), 0);
    assert_eq!(second.duplicates(), 12);
    assert_eq!(
        gateway
            .count_messages(Some(&AccountId::new("acct-1")))
            .await
            .unwrap(),
        12
    );
    assert_eq!(drain(&mut rx), 12);
}

#[tokio::test]
async fn message_is_stored_under_first_account_only() {
    let server = Server::new();
    server.deliver("INBOX", 1, raw_message("shared@example.com", "to both"));

    let gateway = Arc::new(SqliteGateway::in_memory().await.unwrap());
    let (sink, mut rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let config = SyncConfig::default();

    for id in ["acct-a", "acct-b"] {
        let mut session = session_for(&server, id).await;
        sync_all_folders(session.as_mut(), &imap_account(id), &config, &persister)
            .await
            .unwrap();
    }

    assert_eq!(gateway.count_messages(None).await.unwrap(), 1);
    assert_eq!(
        gateway.find_existing_global("<shared@example.com>").await.unwrap(),
        Some(AccountId::new("acct-a"))
    );
    let event = rx.try_recv().unwrap();
    assert_eq!(event.account_id, AccountId::new("acct-a"));
    assert_eq!(event.message.account_id, AccountId::new("acct-a"));
    assert_eq!(drain(&mut rx), 0);
}

#[tokio::test]
async fn unique_constraint_rejection_counts_as_duplicate() {
    let server = Server::new();
    let raw = raw_message("raced@example.com", "raced");
    server.deliver("INBOX", 1, raw.clone());

    let gateway = MemoryGateway::new();
    gateway.blind_lookups();
    let stored = parse_message(&raw)
        .unwrap()
        .into_message(&AccountId::new("acct-2"), "INBOX", 7, 100);
    gateway.preload(stored);

    let (sink, mut rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let mut session = session_for(&server, "acct-1").await;

    let report = sync_folder(
        session.as_mut(),
        &AccountId::new("acct-1"),
        "INBOX",
        &SyncConfig::default(),
        &persister,
    )
    .await
    .unwrap();

    assert_eq!(report.saved, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.aborted_batches, 0);
    assert_eq!(gateway.message_count(), 1);
    assert_eq!(drain(&mut rx), 0);
}

#[tokio::test]
async fn persist_failure_abandons_only_its_batch() {
    let server = Server::new();
    server.fill("INBOX", 15);

    let gateway = MemoryGateway::new();
    gateway.fail_save("<INBOX.3@example.com>");
    let (sink, mut rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let mut session = session_for(&server, "acct-1").await;

    let report = sync_folder(
        session.as_mut(),
        &AccountId::new("acct-1"),
        "INBOX",
        &SyncConfig::default(),
        &persister,
    )
    .await
    .unwrap();

    // uids 1-2 from the first batch, all of 11-15 from the second
    assert_eq!(report.saved, 7);
    assert_eq!(report.aborted_batches, 1);
    assert_eq!(gateway.message_count(), 7);
    assert_eq!(drain(&mut rx), 7);
}

#[tokio::test]
async fn failing_folder_does_not_stop_the_others() {
    let server = Server::new();
    server.fill("INBOX", 3);
    server.fill("Archive", 2);
    server.fail_open("Missing", TransportError::Command("NO [NONEXISTENT]".into()));

    let gateway = MemoryGateway::new();
    let (sink, _rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let account = imap_account("acct-1").with_folders(["INBOX", "Missing", "Archive"]);
    let mut session = session_for(&server, "acct-1").await;

    let report = sync_all_folders(session.as_mut(), &account, &SyncConfig::default(), &persister)
        .await
        .unwrap();

    let synced: Vec<&str> = report.folders.iter().map(|f| f.folder.as_str()).collect();
    assert_eq!(synced, vec!["INBOX", "Archive"]);
    assert_eq!(report.failed_folders.len(), 1);
    assert_eq!(report.failed_folders[0].0, "Missing");
    assert_eq!(gateway.message_count(), 5);
}

#[tokio::test]
async fn lost_connection_ends_the_run() {
    let server = Server::new();
    server.fill("INBOX", 3);
    server.fill("Archive", 2);
    server.fail_fetch("INBOX", 1, TransportError::Io("connection reset".into()));

    let gateway = MemoryGateway::new();
    let (sink, _rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let account = imap_account("acct-1").with_folders(["INBOX", "Archive"]);
    let mut session = session_for(&server, "acct-1").await;

    let err = sync_all_folders(session.as_mut(), &account, &SyncConfig::default(), &persister)
        .await
        .unwrap_err();

    assert!(err.is_connection_lost());
    let opened: Vec<String> = server.opens.lock().unwrap().iter().map(|(f, _)| f.clone()).collect();
    assert_eq!(opened, vec!["INBOX".to_string()]);
    assert_eq!(gateway.message_count(), 0);
}

#[tokio::test]
async fn rejected_fetch_skips_one_batch() {
    let server = Server::new();
    server.fill("INBOX", 12);
    server.fail_fetch("INBOX", 1, TransportError::Command("BAD fetch".into()));

    let gateway = MemoryGateway::new();
    let (sink, _rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let mut session = session_for(&server, "acct-1").await;

    let report = sync_folder(
        session.as_mut(),
        &AccountId::new("acct-1"),
        "INBOX",
        &SyncConfig::default(),
        &persister,
    )
    .await
    .unwrap();

    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.saved, 2);
}

#[tokio::test]
async fn message_without_id_resyncs_idempotently() {
    let server = Server::new();
    server.deliver(
        "INBOX",
        4,
        b"From: carol@example.com\r\nSubject: no id\r\n\r\nbody\r\n".to_vec(),
    );

    let gateway = MemoryGateway::new();
    let (sink, mut rx) = events::channel();
    let persister = Persister::new(gateway.clone(), sink);
    let account = imap_account("acct-1");
    let mut session = session_for(&server, "acct-1").await;
    let config = SyncConfig::default();

    for _ in 0..2 {
        sync_all_folders(session.as_mut(), &account, &config, &persister)
            .await
            .unwrap();
    }

    let stored = gateway.messages_for("acct-1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message_id, "<acct-1.INBOX.4@mailsync.invalid>");
    assert_eq!(drain(&mut rx), 1);
}

#[tokio::test]
async fn empty_folder_is_a_successful_sync() {
    let server = Server::new();
    let gateway = MemoryGateway::new();
    let (sink, _rx) = events::channel();
    let persister = Persister::new(gateway, sink);
    let mut session = session_for(&server, "acct-1").await;

    let report = sync_folder(
        session.as_mut(),
        &AccountId::new("acct-1"),
        "INBOX",
        &SyncConfig::default(),
        &persister,
    )
    .await
    .unwrap();

    assert_eq!(report.found, 0);
    assert_eq!(report.batches, 0);
    assert!(server.fetch_sizes().is_empty());
}
