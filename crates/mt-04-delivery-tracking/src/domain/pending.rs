//! In-flight delivery awaiting acknowledgments.

use serde::{Deserialize, Serialize};
use shared_types::{BlockId, MessageId, RecipientId, Timestamp};
use std::collections::BTreeMap;

use super::announcement::MessageDeliveryMetadata;
use super::status::RecipientStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub message_id: MessageId,
    /// Blocks re-announced on retry.
    pub block_ids: Vec<BlockId>,
    pub metadata: MessageDeliveryMetadata,
    pub recipient_statuses: BTreeMap<RecipientId, RecipientStatus>,
    pub retry_count: u32,
    pub next_retry_at: Timestamp,
}

impl PendingDelivery {
    /// Every unique recipient starts `Announced`.
    pub fn new(
        message_id: MessageId,
        block_ids: Vec<BlockId>,
        metadata: MessageDeliveryMetadata,
        next_retry_at: Timestamp,
    ) -> Self {
        let recipient_statuses = metadata
            .recipient_ids
            .iter()
            .map(|r| (r.clone(), RecipientStatus::Announced))
            .collect();
        Self {
            message_id,
            block_ids,
            metadata,
            recipient_statuses,
            retry_count: 0,
            next_retry_at,
        }
    }

    /// Apply `to` for `recipient` if tracked and legal. Returns the new state.
    pub fn apply(&mut self, recipient: &str, to: RecipientStatus) -> Option<RecipientStatus> {
        let current = self.recipient_statuses.get_mut(recipient)?;
        let next = current.transition(to)?;
        *current = next;
        Some(next)
    }

    /// Every recipient is `Delivered` or `Read`.
    pub fn all_acknowledged(&self) -> bool {
        self.recipient_statuses.values().all(|s| s.is_success())
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next_retry_at <= now
    }

    /// Move every non-terminal recipient to `Failed` and return them.
    pub fn fail_unacknowledged(&mut self) -> Vec<RecipientId> {
        self.recipient_statuses
            .iter_mut()
            .filter(|(_, s)| !s.is_terminal())
            .map(|(r, s)| {
                *s = RecipientStatus::Failed;
                r.clone()
            })
            .collect()
    }

    pub fn recipients(&self) -> Vec<RecipientId> {
        self.recipient_statuses.keys().cloned().collect()
    }
}
