//! # Message Router
//!
//! Per-recipient delivery attempts against the metadata store. Each attempt
//! is bounded by `routing_timeout_ms`; a failed attempt marks the recipient
//! `FAILED` on a best-effort basis. A recipient that already acknowledged
//! keeps its status.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use shared_types::{
    DeliveryStatus, MessageId, MessageMetadataStore, MetadataError, NodeId, RecipientId,
};

use crate::config::RoutingConfig;
use crate::domain::strategy::unique_in_order;
use crate::domain::{
    determine_strategy, is_forwarding_loop, RoutingError, RoutingResult, RoutingStrategy,
};
use crate::ports::inbound::MessageRoutingApi;

pub struct MessageRouter {
    config: RoutingConfig,
    local_node: NodeId,
    metadata: Arc<dyn MessageMetadataStore>,
}

impl MessageRouter {
    pub fn new(
        config: RoutingConfig,
        local_node: NodeId,
        metadata: Arc<dyn MessageMetadataStore>,
    ) -> Self {
        Self {
            config,
            local_node,
            metadata,
        }
    }

    pub fn local_node(&self) -> NodeId {
        self.local_node
    }

    async fn mark_in_transit(
        &self,
        message_id: &MessageId,
        recipient: &str,
    ) -> Result<(), MetadataError> {
        let current = self
            .metadata
            .get(message_id)
            .await?
            .and_then(|record| record.status_of(recipient));
        if current.is_some_and(DeliveryStatus::is_acknowledged) {
            debug!(message_id = %message_id, recipient, status = ?current, "Recipient already acknowledged");
            return Ok(());
        }
        self.metadata
            .update_delivery_status(message_id, recipient, DeliveryStatus::InTransit)
            .await
    }

    /// Transition one recipient to `IN_TRANSIT` within the timeout.
    async fn attempt(&self, message_id: &MessageId, recipient: &str) -> Result<(), String> {
        let budget = self.config.routing_timeout();
        match timeout(budget, self.mark_in_transit(message_id, recipient)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "delivery attempt timed out after {}ms",
                budget.as_millis()
            )),
        }
    }

    async fn mark_failed(&self, message_id: &MessageId, recipient: &str) {
        let outcome = timeout(
            self.config.routing_timeout(),
            self.metadata
                .update_delivery_status(message_id, recipient, DeliveryStatus::Failed),
        )
        .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(message_id = %message_id, recipient, error = %e, "Could not mark recipient failed")
            }
            Err(_) => {
                warn!(message_id = %message_id, recipient, "Timed out marking recipient failed")
            }
        }
    }
}

#[async_trait]
impl MessageRoutingApi for MessageRouter {
    fn determine_strategy(&self, recipients: &[RecipientId]) -> RoutingStrategy {
        determine_strategy(recipients)
    }

    async fn route_message(
        &self,
        message_id: &MessageId,
        recipients: &[RecipientId],
    ) -> Result<RoutingResult, RoutingError> {
        let strategy = determine_strategy(recipients);
        let mut result = RoutingResult::new(strategy);
        if recipients.is_empty() {
            debug!(message_id = %message_id, "No recipients, broadcasting via gossip");
            return Ok(result);
        }

        for recipient in unique_in_order(recipients) {
            match self.attempt(message_id, recipient).await {
                Ok(()) => result.succeed(recipient),
                Err(reason) => {
                    debug!(message_id = %message_id, recipient = %recipient, %reason, "Delivery attempt failed");
                    self.mark_failed(message_id, recipient).await;
                    result.fail(recipient, reason);
                }
            }
        }

        if result.successful_recipients.is_empty() {
            warn!(
                message_id = %message_id,
                failed = result.failed_recipients.len(),
                "Routing failed for every recipient"
            );
            return Err(RoutingError::DeliveryFailed {
                message_id: *message_id,
                errors: result.errors,
            });
        }

        info!(
            message_id = %message_id,
            ?strategy,
            succeeded = result.successful_recipients.len(),
            failed = result.failed_recipients.len(),
            "Message routed"
        );
        Ok(result)
    }

    async fn forward_message(
        &self,
        message_id: &MessageId,
        recipients: &[RecipientId],
        forwarding_path: &[NodeId],
    ) -> Result<RoutingResult, RoutingError> {
        if is_forwarding_loop(forwarding_path, &self.local_node) {
            warn!(
                message_id = %message_id,
                node_id = %self.local_node,
                hops = forwarding_path.len(),
                "Forwarding loop detected, not routing"
            );
            let reason = RoutingError::ForwardingLoopDetected {
                node_id: self.local_node,
            }
            .to_string();
            let mut result = RoutingResult::new(determine_strategy(recipients));
            for recipient in unique_in_order(recipients) {
                result.fail(recipient, reason.clone());
            }
            return Ok(result);
        }
        self.route_message(message_id, recipients).await
    }
}
