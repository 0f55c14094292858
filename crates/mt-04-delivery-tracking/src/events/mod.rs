//! Events and error types for delivery tracking and gossip.

use serde::{Deserialize, Serialize};
use shared_types::{BlockId, MessageId, NodeId, RecipientId};
use thiserror::Error;

use crate::domain::MessageDeliveryMetadata;

/// Terminal outcome of a tracked delivery. Emitted at most once per message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryEvent {
    /// Every recipient acknowledged.
    Delivered {
        message_id: MessageId,
        recipients: Vec<RecipientId>,
    },
    /// Retries exhausted. Lists only the recipients that were still unacknowledged.
    Failed {
        message_id: MessageId,
        failed_recipients: Vec<RecipientId>,
    },
}

impl DeliveryEvent {
    pub fn message_id(&self) -> MessageId {
        match self {
            DeliveryEvent::Delivered { message_id, .. } | DeliveryEvent::Failed { message_id, .. } => {
                *message_id
            }
        }
    }
}

/// Announcements surfaced to local listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipEvent {
    BlockAnnounced { block_id: BlockId, node_id: NodeId },
    BlockRemoved { block_id: BlockId, node_id: NodeId },
    /// A message addressed to local users arrived.
    IncomingMessage {
        metadata: MessageDeliveryMetadata,
        local_recipients: Vec<RecipientId>,
        from: NodeId,
    },
}

/// Peer network failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Peer unreachable: {peer}")]
    Unreachable { peer: NodeId },

    #[error("Send to {peer} failed: {reason}")]
    SendFailed { peer: NodeId, reason: String },
}

/// Gossip errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GossipError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// No content blocks and no header block to announce.
    #[error("Nothing to announce for message {message_id}")]
    EmptyAnnouncement { message_id: MessageId },
}
