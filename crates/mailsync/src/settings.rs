//! Daemon settings file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mailsync_core::{Account, SyncConfig};
use serde::Deserialize;

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "MAILSYNC_CONFIG";

/// Settings read from `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `SQLite` database file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Synchronization tuning.
    pub sync: SyncConfig,
    /// Accounts written to the database at start-up.
    pub accounts: Vec<Account>,
}

impl Settings {
    /// Parses settings from JSON text.
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("invalid settings file")
    }

    /// Loads settings from `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&contents)
    }

    /// Database file to open.
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mailsync")
                .join("mailsync.db")
        })
    }
}

/// Database path as the store expects it.
///
/// Non-UTF-8 paths are rejected rather than replaced.
pub fn database_location(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("database path is not valid UTF-8: {}", path.display()))
}

/// Settings file location: `$MAILSYNC_CONFIG`, else the platform config
/// directory.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(
        || {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mailsync")
                .join("config.json")
        },
        PathBuf::from,
    )
}
