//! In-memory `PeerNetwork` that records every batch instead of sending it.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::time::Duration;
use tracing::trace;

use shared_types::NodeId;

use crate::domain::{Announcement, PeerInfo};
use crate::events::NetworkError;
use crate::ports::outbound::PeerNetwork;

/// Fixed peer list, captured sends and per-peer failure injection.
#[derive(Default)]
pub struct RecordingPeerNetwork {
    peers: RwLock<Vec<PeerInfo>>,
    sent: Mutex<Vec<(NodeId, Vec<Announcement>)>>,
    unreachable: RwLock<HashSet<NodeId>>,
    send_delay: RwLock<Option<Duration>>,
}

impl RecordingPeerNetwork {
    pub fn new(peers: Vec<PeerInfo>) -> Self {
        Self {
            peers: RwLock::new(peers),
            ..Self::default()
        }
    }

    /// `count` peers with node ids `1..=count` and equal reputation.
    pub fn with_peer_count(count: u8) -> Self {
        Self::new(
            (1..=count)
                .map(|i| PeerInfo::new(NodeId::new([i; 32]), 1.0))
                .collect(),
        )
    }

    pub fn set_peers(&self, peers: Vec<PeerInfo>) {
        *self.peers.write() = peers;
    }

    /// Sends to `peer` fail until `restore` is called.
    pub fn fail_sends_to(&self, peer: NodeId) {
        self.unreachable.write().insert(peer);
    }

    pub fn restore(&self, peer: &NodeId) {
        self.unreachable.write().remove(peer);
    }

    /// Hold every send for `delay` before recording it.
    pub fn delay_sends(&self, delay: Duration) {
        *self.send_delay.write() = Some(delay);
    }

    /// Every successful send as `(peer, batch)`, oldest first.
    pub fn sent(&self) -> Vec<(NodeId, Vec<Announcement>)> {
        self.sent.lock().clone()
    }

    /// Drain the recorded sends.
    pub fn take_sent(&self) -> Vec<(NodeId, Vec<Announcement>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Announcements delivered to `peer`, batches flattened.
    pub fn sent_to(&self, peer: &NodeId) -> Vec<Announcement> {
        self.sent
            .lock()
            .iter()
            .filter(|(p, _)| p == peer)
            .flat_map(|(_, batch)| batch.iter().cloned())
            .collect()
    }

    /// Distinct peers that received at least one batch.
    pub fn recipients(&self) -> HashSet<NodeId> {
        self.sent.lock().iter().map(|(p, _)| *p).collect()
    }
}

#[async_trait]
impl PeerNetwork for RecordingPeerNetwork {
    fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peers.read().clone()
    }

    async fn send_announcements(
        &self,
        peer: NodeId,
        batch: Vec<Announcement>,
    ) -> Result<(), NetworkError> {
        if self.unreachable.read().contains(&peer) {
            return Err(NetworkError::Unreachable { peer });
        }
        let delay = *self.send_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        trace!(peer = %peer, size = batch.len(), "Recorded announcement batch");
        self.sent.lock().push((peer, batch));
        Ok(())
    }
}
