//! Error types for the IMAP transport.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The IMAP protocol layer reported a failure.
    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Operation timed out.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that did not complete.
        operation: &'static str,
        /// The configured bound.
        after: Duration,
    },

    /// The server closed the session.
    #[error("Connection closed by server: {0}")]
    Closed(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Returns true if the session can no longer be used after this error.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        match self {
            Self::Io(_) | Self::Tls(_) | Self::Timeout { .. } | Self::Closed(_) => true,
            Self::Imap(e) => matches!(
                e,
                async_imap::error::Error::Io(_) | async_imap::error::Error::ConnectionLost
            ),
            Self::InvalidDnsName(_) | Self::Auth(_) | Self::InvalidState(_) => false,
        }
    }

    /// Returns true if the server ended the session on its own terms.
    #[must_use]
    pub const fn is_graceful_close(&self) -> bool {
        matches!(
            self,
            Self::Closed(_) | Self::Imap(async_imap::error::Error::ConnectionLost)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
