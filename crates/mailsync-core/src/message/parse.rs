//! RFC 5322 parser adapter over `mail-parser`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mail_parser::{Address, HeaderValue, MessageParser, MimeHeaders};
use thiserror::Error;

use super::model::{Attachment, DeliveryStatus, Message, MessageBody, synthetic_message_id};
use crate::account::AccountId;

/// Errors produced while parsing a raw message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The server returned no body bytes.
    #[error("message body is empty")]
    Empty,
    /// The bytes are not a recognizable RFC 5322 message.
    #[error("message is not valid RFC 5322")]
    Malformed,
}

/// Fields extracted from a raw message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    /// `Message-ID` in angle brackets.
    pub message_id: Option<String>,
    /// Sender display text (`Name <addr>` or `addr`).
    pub from: Option<String>,
    /// Recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// `Date` header.
    pub date: Option<DateTime<Utc>>,
    /// First plain text part.
    pub text: Option<String>,
    /// First HTML part.
    pub html: Option<String>,
    /// Attachment metadata.
    pub attachments: Vec<Attachment>,
    /// `References` message IDs, oldest first.
    pub references: Vec<String>,
    /// `In-Reply-To` message ID.
    pub in_reply_to: Option<String>,
    /// Raw headers by lowercase name; repeated headers are joined by newlines.
    pub headers: BTreeMap<String, String>,
}

impl ParsedMessage {
    /// Thread identifier: first `References` entry, else `In-Reply-To`.
    #[must_use]
    pub fn thread_id(&self) -> Option<String> {
        self.references
            .first()
            .cloned()
            .or_else(|| self.in_reply_to.clone())
    }

    /// Builds the stored record for a message fetched from `folder`.
    ///
    /// A missing `Message-ID` is replaced by [`synthetic_message_id`] and a
    /// missing `Date` by the current time.
    #[must_use]
    pub fn into_message(self, account_id: &AccountId, folder: &str, uid: u32, size: u32) -> Message {
        let thread_id = self.thread_id();
        Message {
            account_id: account_id.clone(),
            message_id: self
                .message_id
                .unwrap_or_else(|| synthetic_message_id(account_id, folder, uid)),
            thread_id,
            from: self.from.unwrap_or_default(),
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            body: MessageBody {
                text: self.text,
                html: self.html,
            },
            attachments: self.attachments,
            received_at: self.date.unwrap_or_else(Utc::now),
            size,
            folder: folder.to_string(),
            status: DeliveryStatus::Received,
            headers: self.headers,
        }
    }
}

/// Parses raw RFC 5322 bytes.
///
/// # Errors
///
/// Returns `ParseError::Empty` for an empty buffer and
/// `ParseError::Malformed` when no header section can be recognized.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage, ParseError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    let message = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Malformed)?;
    if message.headers().is_empty() {
        return Err(ParseError::Malformed);
    }

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in message.headers_raw() {
        let value = value.trim();
        headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let attachments = message
        .attachments()
        .map(|part| Attachment {
            filename: part.attachment_name().unwrap_or("unknown").to_string(),
            content_type: part.content_type().map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{subtype}", ct.ctype()),
                None => ct.ctype().to_string(),
            }),
            size: part.len() as u64,
        })
        .collect();

    Ok(ParsedMessage {
        message_id: message.message_id().map(|id| format!("<{id}>")),
        from: message.from().and_then(join_addresses),
        to: address_list(message.to()),
        cc: address_list(message.cc()),
        bcc: address_list(message.bcc()),
        subject: message.subject().map(ToString::to_string),
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        text: message.body_text(0).map(|s| s.to_string()),
        html: message.body_html(0).map(|s| s.to_string()),
        attachments,
        references: message_ids(message.references()),
        in_reply_to: message_ids(message.in_reply_to()).into_iter().next(),
        headers,
    })
}

fn message_ids(value: &HeaderValue<'_>) -> Vec<String> {
    match value {
        HeaderValue::Text(id) => vec![format!("<{id}>")],
        HeaderValue::TextList(ids) => ids.iter().map(|id| format!("<{id}>")).collect(),
        _ => Vec::new(),
    }
}

fn format_address(name: Option<&str>, address: Option<&str>) -> Option<String> {
    match (name.filter(|n| !n.is_empty()), address) {
        (Some(name), Some(address)) => Some(format!("{name} <{address}>")),
        (None, Some(address)) => Some(address.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}

fn address_list(addr: Option<&Address<'_>>) -> Vec<String> {
    addr.map(|a| {
        a.iter()
            .filter_map(|a| format_address(a.name.as_deref(), a.address.as_deref()))
            .collect()
    })
    .unwrap_or_default()
}

fn join_addresses(addr: &Address<'_>) -> Option<String> {
    let parts = address_list(Some(addr));
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"Message-ID: <abc123@example.com>\r\n\
From: Alice Example <alice@example.com>\r\n\
To: bob@example.com, Carol <carol@example.com>\r\n\
Subject: Quarterly numbers\r\n\
Date: Mon, 14 Sep 2026 10:00:00 +0000\r\n\
References: <root@example.com> <parent@example.com>\r\n\
In-Reply-To: <parent@example.com>\r\n\
\r\n\
See attached.\r\n";

    const MULTIPART: &[u8] = b"From: alice@example.com\r\n\
To: bob@example.com\r\n\
Subject: Report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain\r\n\
\r\n\
Body text\r\n\
--XYZ\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
\r\n\
PDFDATA\r\n\
--XYZ--\r\n";

    #[test]
    fn parses_headers_and_body() {
        let parsed = parse_message(SIMPLE).unwrap();
        assert_eq!(parsed.message_id.as_deref(), Some("<abc123@example.com>"));
        assert_eq!(parsed.from.as_deref(), Some("Alice Example <alice@example.com>"));
        assert_eq!(
            parsed.to,
            vec!["bob@example.com".to_string(), "Carol <carol@example.com>".to_string()]
        );
        assert_eq!(parsed.subject.as_deref(), Some("Quarterly numbers"));
        assert_eq!(parsed.date.unwrap().to_rfc3339(), "2026-09-14T10:00:00+00:00");
        assert!(parsed.text.unwrap().contains("See attached."));
        assert_eq!(parsed.headers.get("subject").map(String::as_str), Some("Quarterly numbers"));
    }

    #[test]
    fn thread_id_prefers_first_reference() {
        let parsed = parse_message(SIMPLE).unwrap();
        assert_eq!(parsed.references.len(), 2);
        assert_eq!(parsed.thread_id().as_deref(), Some("<root@example.com>"));

        let reply_only = ParsedMessage {
            in_reply_to: Some("<parent@example.com>".into()),
            ..ParsedMessage::default()
        };
        assert_eq!(reply_only.thread_id().as_deref(), Some("<parent@example.com>"));
    }

    #[test]
    fn collects_attachment_metadata() {
        let parsed = parse_message(MULTIPART).unwrap();
        assert_eq!(parsed.attachments.len(), 1);
        let attachment = &parsed.attachments[0];
        assert_eq!(attachment.filename, "report.pdf");
        assert_eq!(attachment.content_type.as_deref(), Some("application/pdf"));
        assert!(attachment.size > 0);
        assert!(parsed.message_id.is_none());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(parse_message(b""), Err(ParseError::Empty));
        assert_eq!(parse_message(b"\r\n  \r\n"), Err(ParseError::Empty));
    }

    #[test]
    fn missing_message_id_gets_stable_synthetic_id() {
        let account = AccountId::new("acct-1");
        let first = parse_message(MULTIPART)
            .unwrap()
            .into_message(&account, "INBOX", 7, 300);
        let second = parse_message(MULTIPART)
            .unwrap()
            .into_message(&account, "INBOX", 7, 300);
        assert_eq!(first.message_id, "<acct-1.INBOX.7@mailsync.invalid>");
        assert_eq!(first.message_id, second.message_id);
        assert_eq!(first.status, DeliveryStatus::Received);
        assert_eq!(first.folder, "INBOX");
        assert_eq!(first.size, 300);
    }
}
