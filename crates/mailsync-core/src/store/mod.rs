//! Persistence gateway.
//!
//! The synchronizer never talks to a database directly; it goes through the
//! [`Gateway`] trait. [`SqliteGateway`] is the bundled implementation.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::account::{Account, AccountId};
use crate::message::Message;

pub use sqlite::SqliteGateway;

/// Errors returned by a [`Gateway`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The message already exists. Raised by the unique constraint on
    /// `(message_id, account_id)` or on `message_id` alone.
    #[error("Duplicate message: {message_id}")]
    Duplicate {
        /// The conflicting message ID.
        message_id: String,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// A stored row could not be decoded.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Result type alias for gateway operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage operations the synchronizer depends on.
///
/// The two lookups answer only what de-duplication needs: whether the
/// account already holds the message, and which account holds it globally.
/// They do not load the stored record.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Returns true if `message_id` is already stored for `account_id`.
    async fn find_existing(&self, message_id: &str, account_id: &AccountId) -> StoreResult<bool>;

    /// Returns the account holding `message_id`, if any account does.
    async fn find_existing_global(&self, message_id: &str) -> StoreResult<Option<AccountId>>;

    /// Inserts a message.
    ///
    /// Implementations must reject duplicates with [`StoreError::Duplicate`].
    async fn save(&self, message: &Message) -> StoreResult<()>;

    /// Records the completion time of a sync.
    async fn update_last_sync(&self, account_id: &AccountId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Marks an account as disabled.
    async fn disable_account(&self, account_id: &AccountId) -> StoreResult<()>;

    /// Lists every enabled account.
    async fn find_enabled_accounts(&self) -> StoreResult<Vec<Account>>;
}
