//! # Message Metadata
//!
//! The persisted `MessageRecord` and the `MessageMetadataStore` port.
//!
//! The store is its own contract rather than an extension of a block
//! metadata store: implementations are free to wrap whatever generic record
//! storage they have and add the message-specific queries on top.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::entities::{
    BlockId, BlockSize, EncryptionScheme, MessageId, MessagePriority, RecipientId, Timestamp,
};
use crate::errors::MetadataError;

/// Per-recipient delivery status as persisted in a `MessageRecord`.
///
/// Routing and message creation only use `Pending`, `InTransit` and
/// `Failed`. The gossip delivery tracker pushes its outcomes (`Delivered`,
/// `Read`, `Bounced`, `Failed`) into the same map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered,
    Read,
    Bounced,
    Failed,
}

impl DeliveryStatus {
    /// Receipt confirmed by the recipient.
    pub fn is_acknowledged(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Read)
    }
}

/// Persisted metadata for one message.
///
/// Records are written as a whole value, so no reader ever observes a
/// partially populated record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Content address of the header block (the retrieval key).
    pub id: MessageId,
    pub message_type: String,
    pub sender_id: String,
    /// Recipients in the order supplied, duplicates included. Empty means broadcast.
    pub recipients: Vec<RecipientId>,
    pub priority: MessagePriority,
    pub encryption_scheme: EncryptionScheme,
    /// One entry per unique recipient.
    pub delivery_status: BTreeMap<RecipientId, DeliveryStatus>,
    /// Receipt timestamps (ms) per recipient.
    pub acknowledgments: BTreeMap<RecipientId, Timestamp>,
    /// Content spans more than one block.
    pub is_cbl: bool,
    /// Content block addresses in order; empty unless `is_cbl`.
    pub content_block_ids: Vec<BlockId>,
    /// Creation time (ms).
    pub created_at: Timestamp,
    /// Original content length in bytes.
    pub size: u64,
    pub block_size: BlockSize,
}

impl MessageRecord {
    /// Status map with every unique recipient set to `Pending`.
    pub fn pending_statuses(recipients: &[RecipientId]) -> BTreeMap<RecipientId, DeliveryStatus> {
        recipients
            .iter()
            .map(|r| (r.clone(), DeliveryStatus::Pending))
            .collect()
    }

    /// Unique recipients, sorted.
    pub fn unique_recipients(&self) -> BTreeSet<RecipientId> {
        self.recipients.iter().cloned().collect()
    }

    pub fn status_of(&self, recipient_id: &str) -> Option<DeliveryStatus> {
        self.delivery_status.get(recipient_id).copied()
    }

    /// Whether the message was sent to everyone (no explicit recipients).
    pub fn is_broadcast(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Filter for `MessageMetadataStore::query_messages`.
///
/// All set fields must match. `limit` caps the number of results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    pub sender_id: Option<String>,
    pub recipient_id: Option<RecipientId>,
    pub message_type: Option<String>,
    pub priority: Option<MessagePriority>,
    /// At least one recipient currently in this status.
    pub status: Option<DeliveryStatus>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<Timestamp>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<Timestamp>,
    pub limit: Option<usize>,
}

impl MessageFilter {
    pub fn matches(&self, record: &MessageRecord) -> bool {
        if let Some(sender) = &self.sender_id {
            if &record.sender_id != sender {
                return false;
            }
        }
        if let Some(recipient) = &self.recipient_id {
            if !record.delivery_status.contains_key(recipient) {
                return false;
            }
        }
        if let Some(message_type) = &self.message_type {
            if &record.message_type != message_type {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if record.priority != priority {
                return false;
            }
        }
        if let Some(status) = self.status {
            if !record.delivery_status.values().any(|s| *s == status) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if record.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_at >= before {
                return false;
            }
        }
        true
    }
}

/// Persistent message metadata contract.
///
/// Implementations must make each method atomic per message
/// (read-modify-write for status and acknowledgment updates). No
/// cross-message transactions are assumed.
#[async_trait]
pub trait MessageMetadataStore: Send + Sync {
    /// Insert or replace the record for `record.id`.
    async fn store_message_metadata(&self, record: MessageRecord) -> Result<(), MetadataError>;

    /// Fetch a record. `Ok(None)` when absent.
    async fn get(&self, message_id: &MessageId) -> Result<Option<MessageRecord>, MetadataError>;

    /// Set the delivery status of one recipient.
    async fn update_delivery_status(
        &self,
        message_id: &MessageId,
        recipient_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), MetadataError>;

    /// Record the time a recipient confirmed receipt.
    async fn record_acknowledgment(
        &self,
        message_id: &MessageId,
        recipient_id: &str,
        timestamp: Timestamp,
    ) -> Result<(), MetadataError>;

    /// All records matching `filter`, oldest first.
    async fn query_messages(&self, filter: &MessageFilter)
        -> Result<Vec<MessageRecord>, MetadataError>;
}
