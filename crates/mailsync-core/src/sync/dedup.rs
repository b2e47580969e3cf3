//! De-duplication and persist step.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::account::AccountId;
use crate::events::{EventSink, NewEmail};
use crate::message::Message;
use crate::store::{Gateway, StoreError, StoreResult};

/// What happened to one message handed to [`Persister::persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Stored and announced.
    Saved,
    /// Already stored for the same account.
    AlreadyStored,
    /// Already stored under another account.
    HeldElsewhere(AccountId),
    /// Rejected by the store's unique constraint.
    Conflict,
}

impl PersistOutcome {
    /// Returns true for every outcome except `Saved`.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        !matches!(self, Self::Saved)
    }
}

/// Totals for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Messages stored.
    pub saved: usize,
    /// Messages skipped as duplicates.
    pub duplicates: usize,
    /// True if a store failure stopped the batch early.
    pub aborted: bool,
}

/// Checks for duplicates, stores new messages and emits `NewEmail`.
#[derive(Clone)]
pub struct Persister {
    gateway: Arc<dyn Gateway>,
    events: EventSink,
}

impl Persister {
    /// Creates a persister writing through `gateway` and announcing on `events`.
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, events: EventSink) -> Self {
        Self { gateway, events }
    }

    /// Persists one message.
    ///
    /// The account and global lookups only avoid pointless writes; the
    /// store's unique constraint decides. A `Duplicate` from `save` is a
    /// [`PersistOutcome::Conflict`], not an error.
    ///
    /// # Errors
    ///
    /// Returns any other gateway error.
    pub async fn persist(&self, message: Message) -> StoreResult<PersistOutcome> {
        let account_id = message.account_id.clone();

        if self
            .gateway
            .find_existing(&message.message_id, &account_id)
            .await?
        {
            debug!(%account_id, message_id = %message.message_id, "Message already stored");
            return Ok(PersistOutcome::AlreadyStored);
        }

        if let Some(holder) = self.gateway.find_existing_global(&message.message_id).await? {
            info!(
                %account_id,
                message_id = %message.message_id,
                held_by = %holder,
                "Message already stored under another account"
            );
            return Ok(PersistOutcome::HeldElsewhere(holder));
        }

        match self.gateway.save(&message).await {
            Ok(()) => {}
            Err(StoreError::Duplicate { message_id }) => {
                debug!(%account_id, %message_id, "Unique constraint rejected message");
                return Ok(PersistOutcome::Conflict);
            }
            Err(e) => return Err(e),
        }

        debug!(%account_id, message_id = %message.message_id, "Message stored");
        self.events.emit(NewEmail {
            message,
            account_id,
        });
        Ok(PersistOutcome::Saved)
    }

    /// Persists a batch in order.
    ///
    /// A store failure is logged and stops the remaining saves of this batch.
    pub async fn persist_batch(&self, messages: Vec<Message>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let total = messages.len();

        for (index, message) in messages.into_iter().enumerate() {
            let message_id = message.message_id.clone();
            let account_id = message.account_id.clone();
            match self.persist(message).await {
                Ok(PersistOutcome::Saved) => outcome.saved += 1,
                Ok(_) => outcome.duplicates += 1,
                Err(e) => {
                    warn!(
                        %account_id,
                        %message_id,
                        skipped = total - index - 1,
                        error = %e,
                        "Persist failed, abandoning rest of batch"
                    );
                    outcome.aborted = true;
                    break;
                }
            }
        }

        outcome
    }
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister").finish_non_exhaustive()
    }
}
