//! Synchronization engine.
//!
//! [`Registry`] is the control surface. Behind it every account runs in its
//! own task that connects, performs a full sync of its folders, then watches
//! the primary folder with IDLE and reconnects on failure up to
//! [`SyncConfig::max_reconnect_attempts`] times.

mod actor;
mod config;
pub mod dedup;
pub mod pipeline;
mod registry;
mod status;

pub use config::SyncConfig;
pub use dedup::{BatchOutcome, PersistOutcome, Persister};
pub use pipeline::{FolderReport, SyncReport, sync_all_folders, sync_folder};
pub use registry::Registry;
pub use status::{ConnectionStatus, StartReport, StatusReport};
