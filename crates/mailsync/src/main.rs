//! `mailsync` - keeps a local mail store in sync with IMAP accounts.
//!
//! Reads `config.json`, opens the `SQLite` store, starts every enabled
//! account and runs until interrupted.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use mailsync_core::{EventReceiver, ImapConnector, Registry, SqliteGateway, events};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailsync=info,mailsync_core=info,mailsync_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mailsync");

    let config_path = settings::config_path();
    let settings = Settings::load(&config_path).await?;

    let db_path = settings.database_path();
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let gateway = SqliteGateway::new(settings::database_location(&db_path)?)
        .await
        .context("failed to open database")?;
    info!(path = %db_path.display(), "Database opened");

    for account in &settings.accounts {
        gateway
            .upsert_account(account)
            .await
            .with_context(|| format!("failed to store account {}", account.id))?;
    }

    let (sink, receiver) = events::channel();
    let consumer = tokio::spawn(log_new_mail(receiver));

    let connector = Arc::new(ImapConnector::new(&settings.sync));
    let registry = Registry::new(connector, Arc::new(gateway), sink, settings.sync);

    let report = registry.start_all().await?;
    info!(
        started = report.started.len(),
        failed = report.failed.len(),
        "Accounts started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutting down");

    registry.stop_all().await;
    drop(registry);
    if let Err(e) = consumer.await {
        warn!(error = %e, "Event consumer ended abnormally");
    }

    info!("Stopped");
    Ok(())
}

/// Logs every `NewEmail` until the registry is dropped.
async fn log_new_mail(mut receiver: EventReceiver) {
    while let Some(event) = receiver.recv().await {
        info!(
            account_id = %event.account_id,
            message_id = %event.message.message_id,
            from = %event.message.from,
            subject = event.message.subject.as_deref().unwrap_or(""),
            "New email"
        );
    }
}
