//! Stored message model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Delivery state of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Fetched from a mailbox.
    #[default]
    Received,
    /// Sent by the user.
    Sent,
    /// Sending failed.
    Failed,
    /// Waiting to be sent.
    Queued,
}

impl DeliveryStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Queued => "queued",
        }
    }

    /// Parses the storage representation, falling back to `Received`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            "queued" => Self::Queued,
            _ => Self::Received,
        }
    }
}

/// Text and HTML renditions of a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Plain text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
}

/// Attachment metadata. Content is not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name, `unknown` when the part carries none.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: Option<String>,
    /// Decoded size in bytes.
    pub size: u64,
}

/// A synchronized message, unique per `(message_id, account_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Owning account.
    pub account_id: AccountId,
    /// RFC 5322 `Message-ID` in angle brackets, or a synthesized stand-in.
    pub message_id: String,
    /// First `References` entry, else `In-Reply-To`.
    pub thread_id: Option<String>,
    /// Sender as display text.
    pub from: String,
    /// Recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Body renditions.
    pub body: MessageBody,
    /// Attachment metadata.
    pub attachments: Vec<Attachment>,
    /// `Date` header, or the sync time when absent.
    pub received_at: DateTime<Utc>,
    /// Raw message size in bytes.
    pub size: u32,
    /// Folder the message was fetched from.
    pub folder: String,
    /// Delivery state.
    pub status: DeliveryStatus,
    /// Raw headers by lowercase name.
    pub headers: BTreeMap<String, String>,
}

/// Stable identifier for a message that has no `Message-ID` header.
///
/// Built from the account, folder and UID so that re-syncing the same
/// mailbox produces the same identifier.
#[must_use]
pub fn synthetic_message_id(account_id: &AccountId, folder: &str, uid: u32) -> String {
    format!("<{account_id}.{folder}.{uid}@mailsync.invalid>")
}
