//! Inbound ports (API) for delivery tracking.

use async_trait::async_trait;

use crate::domain::DeliveryAck;

/// Receives acknowledgments addressed to the local node.
#[async_trait]
pub trait AckHandler: Send + Sync {
    async fn on_delivery_ack(&self, ack: DeliveryAck);
}
