//! `NewEmail` event channel.
//!
//! Every message stored for the first time is announced once on an unbounded
//! channel. Emission never blocks the pipeline and a dropped receiver is not
//! an error.

use tokio::sync::mpsc;
use tracing::debug;

use crate::account::AccountId;
use crate::message::Message;

/// Emitted after a message has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmail {
    /// The stored message.
    pub message: Message,
    /// Account the message belongs to.
    pub account_id: AccountId,
}

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<NewEmail>;

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<NewEmail>,
}

impl EventSink {
    /// Publishes an event. Returns false if no receiver is listening.
    pub fn emit(&self, event: NewEmail) -> bool {
        let message_id = event.message.message_id.clone();
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!(%message_id, "No event consumer, dropping NewEmail");
                false
            }
        }
    }
}

/// Creates a connected sink and receiver.
#[must_use]
pub fn channel() -> (EventSink, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}
