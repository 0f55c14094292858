//! Peer selection for fanout.

use shared_types::NodeId;

/// A connected peer as reported by the network.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeerInfo {
    pub node_id: NodeId,
    /// Higher is better. Used to pick fanout targets.
    pub reputation: f64,
}

impl PeerInfo {
    pub fn new(node_id: NodeId, reputation: f64) -> Self {
        Self {
            node_id,
            reputation,
        }
    }
}

/// Top `fanout` peers by reputation, ties broken by node id.
pub fn select_peers(peers: &[PeerInfo], fanout: usize) -> Vec<PeerInfo> {
    let mut sorted = peers.to_vec();
    sorted.sort_by(|a, b| {
        b.reputation
            .total_cmp(&a.reputation)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    sorted.truncate(fanout);
    sorted
}
