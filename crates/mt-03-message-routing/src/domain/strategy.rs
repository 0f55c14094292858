//! Strategy selection and forwarding path checks. Pure functions.

use serde::{Deserialize, Serialize};
use shared_types::{NodeId, RecipientId};
use std::collections::{BTreeMap, HashSet};

/// How a message reaches its recipients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingStrategy {
    /// Addressed recipients.
    Direct,
    /// Broadcast to everyone.
    Gossip,
}

/// `Gossip` for an empty list, `Direct` otherwise.
pub fn determine_strategy(recipients: &[RecipientId]) -> RoutingStrategy {
    if recipients.is_empty() {
        RoutingStrategy::Gossip
    } else {
        RoutingStrategy::Direct
    }
}

/// Whether `local` already forwarded this message.
pub fn is_forwarding_loop(path: &[NodeId], local: &NodeId) -> bool {
    path.contains(local)
}

/// Path to propagate with the next hop.
pub fn extend_forwarding_path(path: &[NodeId], local: NodeId) -> Vec<NodeId> {
    let mut extended = Vec::with_capacity(path.len() + 1);
    extended.extend_from_slice(path);
    extended.push(local);
    extended
}

/// Recipients in first-seen order, duplicates removed.
pub(crate) fn unique_in_order(recipients: &[RecipientId]) -> Vec<&RecipientId> {
    let mut seen = HashSet::with_capacity(recipients.len());
    recipients.iter().filter(|r| seen.insert(r.as_str())).collect()
}

/// Outcome of routing one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub strategy: RoutingStrategy,
    pub successful_recipients: Vec<RecipientId>,
    pub failed_recipients: Vec<RecipientId>,
    /// Failure reason per failed recipient.
    pub errors: BTreeMap<RecipientId, String>,
}

impl RoutingResult {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            successful_recipients: Vec::new(),
            failed_recipients: Vec::new(),
            errors: BTreeMap::new(),
        }
    }

    pub(crate) fn succeed(&mut self, recipient: &RecipientId) {
        self.successful_recipients.push(recipient.clone());
    }

    pub(crate) fn fail(&mut self, recipient: &RecipientId, reason: impl Into<String>) {
        self.failed_recipients.push(recipient.clone());
        self.errors.insert(recipient.clone(), reason.into());
    }

    /// Some but not all recipients succeeded.
    pub fn is_partial(&self) -> bool {
        !self.successful_recipients.is_empty() && !self.failed_recipients.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_recipients.is_empty()
    }
}
