//! Error types for the core library.

use thiserror::Error;

use crate::account::{AccountId, ValidationError};
use crate::message::ParseError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The account cannot be registered as configured.
    #[error("Configuration error: {}", join(.0))]
    Config(Vec<ValidationError>),

    /// Transport operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A raw message could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Persistence gateway operation failed.
    #[error("Persist error: {0}")]
    Persist(#[from] StoreError),

    /// Account is not registered.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account was disabled after exhausting its reconnect attempts.
    #[error("Account disabled: {0}")]
    AccountDisabled(AccountId),

    /// The account was deregistered while the request was in flight.
    #[error("Request cancelled for account: {0}")]
    Cancelled(AccountId),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
