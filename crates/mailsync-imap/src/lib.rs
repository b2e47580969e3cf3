//! # mailsync-imap
//!
//! IMAP transport used by the mailsync daemon.
//!
//! Built on `async-imap` over a rustls stream, it covers exactly the command
//! set a folder synchronizer needs:
//!
//! - TCP or implicit-TLS connect and `LOGIN`
//! - `EXAMINE` / `SELECT`
//! - `UID SEARCH SINCE <date>`
//! - batched `UID FETCH (UID RFC822.SIZE BODY.PEEK[])`
//! - `IDLE` with timeout and caller interruption
//! - `LOGOUT`
//!
//! Every round trip is bounded by a timeout so a stalled server surfaces as
//! [`Error::Timeout`] instead of hanging the caller.
//!
//! ## Example
//!
//! ```ignore
//! use mailsync_imap::{Config, Security, Session};
//!
//! let config = Config::builder("imap.example.com")
//!     .security(Security::Implicit)
//!     .credentials("user@example.com", "password")
//!     .build();
//!
//! let mut session = Session::connect(&config).await?;
//! session.open_folder("INBOX", true).await?;
//! let since = chrono::Utc::now().date_naive() - chrono::Days::new(30);
//! let uids = session.search_since(since).await?;
//! for batch in uids.chunks(10) {
//!     for raw in session.fetch_raw(batch).await? {
//!         println!("{} ({} bytes)", raw.uid, raw.size);
//!     }
//! }
//! session.logout().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod query;
pub mod session;
pub mod stream;

pub use config::{Config, ConfigBuilder, Security};
pub use error::{Error, Result};
pub use session::{ChangeSignal, RawMessage, Session};
pub use stream::ImapStream;
