//! Outbound ports (SPI) for delivery tracking.

use async_trait::async_trait;
use shared_types::{BlockId, NodeId};

use crate::domain::{Announcement, MessageDeliveryMetadata, PeerInfo};
use crate::events::{GossipError, NetworkError};

/// Transport to gossip peers. Wire framing is the implementor's concern.
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    fn connected_peers(&self) -> Vec<PeerInfo>;

    /// Deliver one batch to one peer.
    async fn send_announcements(
        &self,
        peer: NodeId,
        batch: Vec<Announcement>,
    ) -> Result<(), NetworkError>;
}

/// Announces message blocks with delivery metadata. Used for retries.
#[async_trait]
pub trait DeliveryAnnouncer: Send + Sync {
    async fn announce_message(
        &self,
        block_ids: &[BlockId],
        metadata: &MessageDeliveryMetadata,
    ) -> Result<(), GossipError>;
}
