//! # Gossip Announcements
//!
//! The unit exchanged between nodes. A payload is exactly one of a plain
//! block reference, a message delivery, or a delivery acknowledgment.

use serde::{Deserialize, Serialize};
use shared_types::{BlockId, MessageId, MessagePriority, NodeId, RecipientId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementKind {
    Add,
    Remove,
    Ack,
}

/// Delivery metadata attached to a message announcement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageDeliveryMetadata {
    pub message_id: MessageId,
    pub recipient_ids: Vec<RecipientId>,
    #[serde(default)]
    pub priority: MessagePriority,
    /// Content blocks of the message.
    pub block_ids: Vec<BlockId>,
    /// Header block, when the content is indexed by one.
    pub cbl_block_id: Option<BlockId>,
    pub ack_required: bool,
}

/// Status reported by a recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Delivered,
    Read,
    Bounced,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub message_id: MessageId,
    pub recipient_id: RecipientId,
    pub status: AckStatus,
    /// Node that announced the message; acks travel back to it.
    pub original_sender_node: NodeId,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnouncementPayload {
    /// Plain block availability, no delivery semantics.
    Block,
    MessageDelivery(MessageDeliveryMetadata),
    DeliveryAck(DeliveryAck),
}

/// Immutable gossip unit. Forwarding produces a copy with a lower `ttl`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub kind: AnnouncementKind,
    pub block_id: BlockId,
    /// Originating node.
    pub node_id: NodeId,
    pub timestamp: Timestamp,
    /// Remaining hops.
    pub ttl: u32,
    pub payload: AnnouncementPayload,
}

/// Identity of an announcement independent of its remaining hops.
pub type AnnouncementKey = (AnnouncementKind, BlockId, NodeId, Timestamp, AnnouncementPayload);

impl Announcement {
    pub fn block(
        kind: AnnouncementKind,
        block_id: BlockId,
        node_id: NodeId,
        timestamp: Timestamp,
        ttl: u32,
    ) -> Self {
        Self {
            kind,
            block_id,
            node_id,
            timestamp,
            ttl,
            payload: AnnouncementPayload::Block,
        }
    }

    pub fn message_delivery(
        block_id: BlockId,
        node_id: NodeId,
        timestamp: Timestamp,
        ttl: u32,
        metadata: MessageDeliveryMetadata,
    ) -> Self {
        Self {
            kind: AnnouncementKind::Add,
            block_id,
            node_id,
            timestamp,
            ttl,
            payload: AnnouncementPayload::MessageDelivery(metadata),
        }
    }

    pub fn delivery_ack(node_id: NodeId, timestamp: Timestamp, ttl: u32, ack: DeliveryAck) -> Self {
        Self {
            kind: AnnouncementKind::Ack,
            block_id: ack.message_id.block_id(),
            node_id,
            timestamp,
            ttl,
            payload: AnnouncementPayload::DeliveryAck(ack),
        }
    }

    /// Neither a message delivery nor an ack.
    pub fn is_plain(&self) -> bool {
        matches!(self.payload, AnnouncementPayload::Block)
    }

    pub fn message_delivery_metadata(&self) -> Option<&MessageDeliveryMetadata> {
        match &self.payload {
            AnnouncementPayload::MessageDelivery(m) => Some(m),
            _ => None,
        }
    }

    pub fn key(&self) -> AnnouncementKey {
        (
            self.kind,
            self.block_id,
            self.node_id,
            self.timestamp,
            self.payload.clone(),
        )
    }

    /// Copy for the next hop.
    pub fn forwarded(&self, ttl: u32) -> Self {
        Self {
            ttl,
            ..self.clone()
        }
    }
}
