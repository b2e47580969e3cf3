//! `SQLite` gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::{Gateway, StoreError, StoreResult};
use crate::account::{Account, AccountId, ImapConfig, Provider};
use crate::message::{DeliveryStatus, Message, MessageBody};

/// Gateway backed by a `SQLite` database.
///
/// Messages are unique per `(message_id, account_id)` and, through a second
/// unique index, per `message_id` across all accounts.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Create a new gateway with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> StoreResult<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let gateway = Self { pool };
        gateway.initialize().await?;
        Ok(gateway)
    }

    /// Create an in-memory gateway for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let gateway = Self { pool };
        gateway.initialize().await?;
        Ok(gateway)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                email TEXT NOT NULL,
                display_name TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                imap_host TEXT,
                imap_port INTEGER,
                imap_secure INTEGER,
                imap_username TEXT,
                imap_password TEXT,
                folders TEXT NOT NULL DEFAULT '[]',
                last_sync TEXT,
                sync_frequency_minutes INTEGER NOT NULL DEFAULT 15,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                thread_id TEXT,
                from_addr TEXT NOT NULL,
                to_addrs TEXT NOT NULL,
                cc_addrs TEXT NOT NULL,
                bcc_addrs TEXT NOT NULL,
                subject TEXT,
                body_text TEXT,
                body_html TEXT,
                attachments TEXT NOT NULL,
                received_at TEXT NOT NULL,
                size INTEGER NOT NULL,
                folder TEXT NOT NULL,
                status TEXT NOT NULL,
                headers TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(message_id, account_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_message_id ON messages(message_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_account ON messages(account_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or replace an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_account(&self, account: &Account) -> StoreResult<()> {
        let imap = account.imap.as_ref();
        sqlx::query(
            r"
            INSERT INTO accounts (
                id, provider, email, display_name, enabled,
                imap_host, imap_port, imap_secure, imap_username, imap_password,
                folders, last_sync, sync_frequency_minutes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                provider = excluded.provider,
                email = excluded.email,
                display_name = excluded.display_name,
                enabled = excluded.enabled,
                imap_host = excluded.imap_host,
                imap_port = excluded.imap_port,
                imap_secure = excluded.imap_secure,
                imap_username = excluded.imap_username,
                imap_password = excluded.imap_password,
                folders = excluded.folders,
                sync_frequency_minutes = excluded.sync_frequency_minutes,
                updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(account.id.as_str())
        .bind(account.provider.as_str())
        .bind(&account.email)
        .bind(account.display_name.as_deref())
        .bind(account.enabled)
        .bind(imap.map(|c| c.host.as_str()))
        .bind(imap.map(|c| i64::from(c.port)))
        .bind(imap.map(|c| c.secure))
        .bind(imap.map(|c| c.username.as_str()))
        .bind(imap.map(|c| c.password.as_str()))
        .bind(serde_json::to_string(&account.folders)?)
        .bind(account.last_sync.map(|t| t.to_rfc3339()))
        .bind(i64::from(account.sync_frequency_minutes))
        .execute(&self.pool)
        .await?;

        debug!(account_id = %account.id, "Account upserted");
        Ok(())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the row is malformed.
    pub async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!("{ACCOUNT_COLUMNS} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// List the messages stored for an account, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a row is malformed.
    pub async fn list_messages(&self, account_id: &AccountId) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "{MESSAGE_COLUMNS} WHERE account_id = ? ORDER BY received_at ASC, id ASC"
        ))
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Count stored messages, optionally restricted to one account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_messages(&self, account_id: Option<&AccountId>) -> StoreResult<i64> {
        let count: i64 = match account_id {
            Some(id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE account_id = ?")
                    .bind(id.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM messages")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn find_existing(&self, message_id: &str, account_id: &AccountId) -> StoreResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM messages WHERE message_id = ? AND account_id = ?")
                .bind(message_id)
                .bind(account_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn find_existing_global(&self, message_id: &str) -> StoreResult<Option<AccountId>> {
        let holder: Option<String> =
            sqlx::query_scalar("SELECT account_id FROM messages WHERE message_id = ? LIMIT 1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(holder.map(AccountId::from))
    }

    async fn save(&self, message: &Message) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            INSERT INTO messages (
                message_id, account_id, thread_id, from_addr,
                to_addrs, cc_addrs, bcc_addrs, subject,
                body_text, body_html, attachments, received_at,
                size, folder, status, headers
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&message.message_id)
        .bind(message.account_id.as_str())
        .bind(message.thread_id.as_deref())
        .bind(&message.from)
        .bind(serde_json::to_string(&message.to)?)
        .bind(serde_json::to_string(&message.cc)?)
        .bind(serde_json::to_string(&message.bcc)?)
        .bind(message.subject.as_deref())
        .bind(message.body.text.as_deref())
        .bind(message.body.html.as_deref())
        .bind(serde_json::to_string(&message.attachments)?)
        .bind(message.received_at.to_rfc3339())
        .bind(i64::from(message.size))
        .bind(&message.folder)
        .bind(message.status.as_str())
        .bind(serde_json::to_string(&message.headers)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate {
                    message_id: message.message_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_last_sync(&self, account_id: &AccountId, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET last_sync = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(account_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(account_id.clone()));
        }
        Ok(())
    }

    async fn disable_account(&self, account_id: &AccountId) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET enabled = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(account_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(account_id.clone()));
        }
        Ok(())
    }

    async fn find_enabled_accounts(&self) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(&format!("{ACCOUNT_COLUMNS} WHERE enabled = 1 ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_account).collect()
    }
}

const ACCOUNT_COLUMNS: &str = r"
    SELECT id, provider, email, display_name, enabled,
           imap_host, imap_port, imap_secure, imap_username, imap_password,
           folders, last_sync, sync_frequency_minutes
    FROM accounts";

const MESSAGE_COLUMNS: &str = r"
    SELECT message_id, account_id, thread_id, from_addr,
           to_addrs, cc_addrs, bcc_addrs, subject,
           body_text, body_html, attachments, received_at,
           size, folder, status, headers
    FROM messages";

fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("timestamp {raw:?}: {e}")))
}

/// Convert a database row to an Account.
fn row_to_account(row: &SqliteRow) -> StoreResult<Account> {
    let host: Option<String> = row.get("imap_host");
    let imap = match host {
        Some(host) => Some(ImapConfig {
            host,
            port: u16::try_from(row.get::<Option<i64>, _>("imap_port").unwrap_or_default())
                .map_err(|e| StoreError::InvalidData(format!("imap_port: {e}")))?,
            secure: row.get::<Option<bool>, _>("imap_secure").unwrap_or(true),
            username: row.get::<Option<String>, _>("imap_username").unwrap_or_default(),
            password: row.get::<Option<String>, _>("imap_password").unwrap_or_default(),
        }),
        None => None,
    };

    let last_sync = row
        .get::<Option<String>, _>("last_sync")
        .map(|raw| parse_time(&raw))
        .transpose()?;

    Ok(Account {
        id: AccountId::from(row.get::<String, _>("id")),
        provider: Provider::from_str_lossy(row.get("provider")),
        email: row.get("email"),
        display_name: row.get("display_name"),
        enabled: row.get("enabled"),
        imap,
        folders: serde_json::from_str(row.get("folders"))?,
        last_sync,
        sync_frequency_minutes: u32::try_from(row.get::<i64, _>("sync_frequency_minutes"))
            .map_err(|e| StoreError::InvalidData(format!("sync_frequency_minutes: {e}")))?,
    })
}

/// Convert a database row to a Message.
fn row_to_message(row: &SqliteRow) -> StoreResult<Message> {
    Ok(Message {
        account_id: AccountId::from(row.get::<String, _>("account_id")),
        message_id: row.get("message_id"),
        thread_id: row.get("thread_id"),
        from: row.get("from_addr"),
        to: serde_json::from_str(row.get("to_addrs"))?,
        cc: serde_json::from_str(row.get("cc_addrs"))?,
        bcc: serde_json::from_str(row.get("bcc_addrs"))?,
        subject: row.get("subject"),
        body: MessageBody {
            text: row.get("body_text"),
            html: row.get("body_html"),
        },
        attachments: serde_json::from_str(row.get("attachments"))?,
        received_at: parse_time(row.get("received_at"))?,
        size: u32::try_from(row.get::<i64, _>("size"))
            .map_err(|e| StoreError::InvalidData(format!("size: {e}")))?,
        folder: row.get("folder"),
        status: DeliveryStatus::from_str_lossy(row.get("status")),
        headers: serde_json::from_str(row.get("headers"))?,
    })
}
