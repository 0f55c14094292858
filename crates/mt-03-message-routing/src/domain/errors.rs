use shared_types::{MessageId, NodeId, RecipientId};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error text recorded for recipients of a looping forward.
pub const FORWARDING_LOOP_DETECTED: &str = "forwarding loop detected";

/// Routing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Every recipient of a non-empty list failed.
    #[error("Delivery failed for message {message_id}: all {} recipients failed", .errors.len())]
    DeliveryFailed {
        message_id: MessageId,
        errors: BTreeMap<RecipientId, String>,
    },

    /// The local node already appears in the forwarding path.
    #[error("forwarding loop detected")]
    ForwardingLoopDetected { node_id: NodeId },
}
