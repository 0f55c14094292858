//! Inbound ports (API) for message routing.

use async_trait::async_trait;
use shared_types::{MessageId, NodeId, RecipientId};

use crate::domain::{RoutingError, RoutingResult, RoutingStrategy};

#[async_trait]
pub trait MessageRoutingApi: Send + Sync {
    fn determine_strategy(&self, recipients: &[RecipientId]) -> RoutingStrategy;

    /// Move every unique recipient to `IN_TRANSIT`.
    ///
    /// Returns `DeliveryFailed` only when a non-empty list fails entirely.
    async fn route_message(
        &self,
        message_id: &MessageId,
        recipients: &[RecipientId],
    ) -> Result<RoutingResult, RoutingError>;

    /// Route unless the local node is already on `forwarding_path`.
    ///
    /// A loop yields every recipient failed with "forwarding loop detected"
    /// and no status change.
    async fn forward_message(
        &self,
        message_id: &MessageId,
        recipients: &[RecipientId],
        forwarding_path: &[NodeId],
    ) -> Result<RoutingResult, RoutingError>;
}
