//! # mailsync-core
//!
//! Multi-account IMAP synchronization and connection-lifecycle manager.
//!
//! This crate provides:
//! - Account configuration and validation
//! - A connection [`Registry`] with one session task per account, bounded
//!   reconnects and IDLE-driven incremental sync
//! - The folder pipeline: `SEARCH SINCE`, batched fetch, parse, persist
//! - De-duplication across accounts, backed by the store's unique constraint
//! - A persistence [`Gateway`](store::Gateway) with a `SQLite` implementation
//! - A `NewEmail` event channel for downstream consumers
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailsync_core::{Registry, SqliteGateway, SyncConfig, events, transport::ImapConnector};
//!
//! let config = SyncConfig::default();
//! let gateway = Arc::new(SqliteGateway::new("mailsync.db").await?);
//! let (sink, mut new_mail) = events::channel();
//! let registry = Registry::new(Arc::new(ImapConnector::new(&config)), gateway, sink, config);
//!
//! registry.start_all().await?;
//! while let Some(event) = new_mail.recv().await {
//!     println!("{}: {:?}", event.account_id, event.message.subject);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
mod error;
pub mod events;
pub mod message;
pub mod store;
pub mod sync;
pub mod transport;

pub use account::{Account, AccountId, ImapConfig, Provider, ValidationError, validate_account};
pub use error::{Error, Result};
pub use events::{EventReceiver, EventSink, NewEmail};
pub use message::{Message, ParseError, ParsedMessage, parse_message};
pub use store::{Gateway, SqliteGateway, StoreError, StoreResult};
pub use sync::{
    ConnectionStatus, FolderReport, Registry, StartReport, StatusReport, SyncConfig, SyncReport,
};
pub use transport::{Connector, ImapConnector, MailSession, TransportError, TransportResult};
