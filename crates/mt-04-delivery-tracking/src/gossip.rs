//! # Gossip Service
//!
//! Epidemic propagation of block, message-delivery and acknowledgment
//! announcements.
//!
//! ## Propagation Rules
//!
//! - **Plain** announcements use the base `fanout` and are forwarded with
//!   `ttl - 1` while `ttl > 0`, whatever the per-priority overrides say.
//! - **Message deliveries** are consumed when a recipient is a local user
//!   (one `delivered` ack per local recipient when `ack_required`) and keep
//!   propagating with the priority fanout and `min(priority_ttl, ttl) - 1`
//!   while any recipient is not local.
//! - **Acks** addressed to this node go to the registered `AckHandler`;
//!   all others are forwarded with the base fanout.
//!
//! Outbound announcements are queued and flushed in per-peer batches of at
//! most `max_batch_size`, either by the recurring flush task or inline for
//! `High` priority messages.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use shared_types::{
    BlockId, MessageId, MessagePriority, NodeId, RecipientId, SystemTimeSource, TimeSource,
    Timestamp,
};

use crate::config::{GossipConfig, GossipConfigError};
use crate::domain::announcement::AnnouncementKey;
use crate::domain::{
    select_peers, AckStatus, Announcement, AnnouncementKind, AnnouncementPayload, DeliveryAck,
    MessageDeliveryMetadata, PeerInfo, SeenCache,
};
use crate::events::{GossipError, GossipEvent, NetworkError};
use crate::ports::inbound::AckHandler;
use crate::ports::outbound::{DeliveryAnnouncer, PeerNetwork};
use crate::timer::RecurringTask;

const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// What `handle_announcement` did with one inbound announcement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandleOutcome {
    /// Already seen; nothing else happened.
    pub duplicate: bool,
    /// Queued for the next hop.
    pub forwarded: bool,
    /// At least one recipient is a local user.
    pub consumed_locally: bool,
    /// Delivery acks generated for local recipients.
    pub acks_sent: usize,
    /// Ack addressed to this node was handed to the `AckHandler`.
    pub ack_handled: bool,
}

/// Result of one queue flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Queued announcements that had at least one target peer.
    pub announcements: usize,
    /// Queued announcements dropped for lack of eligible peers.
    pub undeliverable: usize,
    pub batches_sent: usize,
    pub errors: Vec<NetworkError>,
}

struct Queued {
    announcement: Announcement,
    fanout: u32,
    /// Peer the announcement arrived from.
    exclude: Option<NodeId>,
}

struct GossipInner {
    node_id: NodeId,
    config: GossipConfig,
    network: Arc<dyn PeerNetwork>,
    clock: Arc<dyn TimeSource>,
    local_users: RwLock<HashSet<RecipientId>>,
    /// Duplicate suppression over announcement identity (TTL excluded).
    seen: SeenCache<AnnouncementKey>,
    /// Messages already surfaced as `IncomingMessage`.
    consumed: SeenCache<MessageId>,
    /// Announcement rounds already acknowledged.
    acked: SeenCache<(MessageId, Timestamp)>,
    queue: Mutex<Vec<Queued>>,
    /// Weak so the tracker and the gossip service can reference each other.
    ack_handler: RwLock<Option<Weak<dyn AckHandler>>>,
    events: broadcast::Sender<GossipEvent>,
}

/// Gossip propagation for one node.
///
/// Share via `Arc`; the service is the `DeliveryAnnouncer` the delivery
/// tracker re-announces through.
pub struct GossipService {
    inner: Arc<GossipInner>,
    flush_task: RecurringTask,
}

impl GossipService {
    pub fn new(
        node_id: NodeId,
        config: GossipConfig,
        network: Arc<dyn PeerNetwork>,
    ) -> Result<Self, GossipConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cache_size = config.seen_cache_size;
        Ok(Self {
            inner: Arc::new(GossipInner {
                node_id,
                config,
                network,
                clock: Arc::new(SystemTimeSource),
                local_users: RwLock::new(HashSet::new()),
                seen: SeenCache::new(cache_size),
                consumed: SeenCache::new(cache_size),
                acked: SeenCache::new(cache_size),
                queue: Mutex::new(Vec::new()),
                ack_handler: RwLock::new(None),
                events,
            }),
            flush_task: RecurringTask::new("gossip-flush"),
        })
    }

    /// Call before `start`.
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.clock = clock,
            None => warn!("Gossip service already running, time source not replaced"),
        }
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    pub fn config(&self) -> &GossipConfig {
        &self.inner.config
    }

    pub fn add_local_user(&self, user: impl Into<RecipientId>) {
        self.inner.local_users.write().insert(user.into());
    }

    pub fn remove_local_user(&self, user: &str) -> bool {
        self.inner.local_users.write().remove(user)
    }

    pub fn is_local_user(&self, user: &str) -> bool {
        self.inner.local_users.read().contains(user)
    }

    /// Route acks addressed to this node to `handler`. Only a weak
    /// reference is kept.
    pub fn set_ack_handler<H: AckHandler + 'static>(&self, handler: &Arc<H>) {
        let handler: Arc<dyn AckHandler> = Arc::clone(handler) as Arc<dyn AckHandler>;
        *self.inner.ack_handler.write() = Some(Arc::downgrade(&handler));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GossipEvent> {
        self.inner.events.subscribe()
    }

    /// Announce a locally available block.
    pub fn announce_block(&self, block_id: BlockId) {
        self.inner.announce_plain(AnnouncementKind::Add, block_id);
    }

    /// Announce that a block is no longer available locally.
    pub fn announce_removal(&self, block_id: BlockId) {
        self.inner.announce_plain(AnnouncementKind::Remove, block_id);
    }

    /// Queue one delivery announcement per block, falling back to the header
    /// block when `block_ids` is empty.
    pub async fn announce_message(
        &self,
        block_ids: &[BlockId],
        metadata: &MessageDeliveryMetadata,
    ) -> Result<(), GossipError> {
        self.inner.announce_message(block_ids, metadata).await
    }

    /// Send an ack back towards `ack.original_sender_node`.
    pub async fn send_delivery_ack(&self, ack: DeliveryAck) {
        self.inner.send_delivery_ack(ack).await;
    }

    pub async fn handle_announcement(&self, from: NodeId, announcement: Announcement) -> HandleOutcome {
        self.inner.handle_announcement(from, announcement).await
    }

    /// Send everything queued now.
    pub async fn flush(&self) -> FlushReport {
        self.inner.flush().await
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Start the recurring flush. `false` if already running.
    pub fn start(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        self.flush_task
            .start(self.inner.config.batch_interval(), move || {
                let inner = Arc::clone(&inner);
                async move {
                    inner.flush().await;
                }
            })
    }

    pub fn stop(&self) -> bool {
        self.flush_task.stop()
    }

    pub fn is_running(&self) -> bool {
        self.flush_task.is_running()
    }
}

impl GossipInner {
    fn enqueue(&self, announcement: Announcement, fanout: u32, exclude: Option<NodeId>) {
        trace!(
            block_id = %announcement.block_id,
            kind = ?announcement.kind,
            ttl = announcement.ttl,
            fanout,
            "Queued announcement"
        );
        self.queue.lock().push(Queued {
            announcement,
            fanout,
            exclude,
        });
    }

    /// Queue an announcement originating here. Echoes from peers are dropped.
    fn originate(&self, announcement: Announcement, fanout: u32) {
        self.seen.insert(announcement.key());
        self.enqueue(announcement, fanout, None);
    }

    fn announce_plain(&self, kind: AnnouncementKind, block_id: BlockId) {
        let announcement = Announcement::block(
            kind,
            block_id,
            self.node_id,
            self.clock.now_ms(),
            self.config.default_ttl,
        );
        debug!(block_id = %block_id, ?kind, "Announcing block");
        self.originate(announcement, self.config.fanout);
    }

    async fn announce_message(
        &self,
        block_ids: &[BlockId],
        metadata: &MessageDeliveryMetadata,
    ) -> Result<(), GossipError> {
        let targets: Vec<BlockId> = if !block_ids.is_empty() {
            block_ids.to_vec()
        } else if let Some(cbl) = metadata.cbl_block_id {
            vec![cbl]
        } else {
            return Err(GossipError::EmptyAnnouncement {
                message_id: metadata.message_id,
            });
        };

        let now = self.clock.now_ms();
        let fanout = self.config.fanout_for(metadata.priority);
        let ttl = self.config.ttl_for(metadata.priority);
        for block_id in &targets {
            let announcement =
                Announcement::message_delivery(*block_id, self.node_id, now, ttl, metadata.clone());
            self.originate(announcement, fanout);
        }
        info!(
            message_id = %metadata.message_id,
            blocks = targets.len(),
            recipients = metadata.recipient_ids.len(),
            priority = ?metadata.priority,
            fanout,
            ttl,
            "Announced message"
        );

        if metadata.priority == MessagePriority::High {
            let report = self.flush().await;
            if report.batches_sent == 0 {
                if let Some(e) = report.errors.into_iter().next() {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn send_delivery_ack(&self, ack: DeliveryAck) {
        if ack.original_sender_node == self.node_id {
            self.dispatch_ack(ack).await;
            return;
        }
        debug!(
            message_id = %ack.message_id,
            recipient = %ack.recipient_id,
            status = ?ack.status,
            to = %ack.original_sender_node,
            "Sending delivery ack"
        );
        let announcement =
            Announcement::delivery_ack(self.node_id, self.clock.now_ms(), self.config.default_ttl, ack);
        self.originate(announcement, self.config.fanout);
    }

    /// `true` when a live handler received the ack.
    async fn dispatch_ack(&self, ack: DeliveryAck) -> bool {
        let handler = self.ack_handler.read().as_ref().and_then(Weak::upgrade);
        match handler {
            Some(handler) => {
                handler.on_delivery_ack(ack).await;
                true
            }
            None => {
                debug!(message_id = %ack.message_id, "No ack handler registered, ack dropped");
                false
            }
        }
    }

    async fn handle_announcement(&self, from: NodeId, announcement: Announcement) -> HandleOutcome {
        let mut outcome = HandleOutcome::default();
        if !self.seen.insert(announcement.key()) {
            trace!(block_id = %announcement.block_id, from = %from, "Duplicate announcement dropped");
            outcome.duplicate = true;
            return outcome;
        }

        match &announcement.payload {
            AnnouncementPayload::Block => {
                let event = match announcement.kind {
                    AnnouncementKind::Add => Some(GossipEvent::BlockAnnounced {
                        block_id: announcement.block_id,
                        node_id: announcement.node_id,
                    }),
                    AnnouncementKind::Remove => Some(GossipEvent::BlockRemoved {
                        block_id: announcement.block_id,
                        node_id: announcement.node_id,
                    }),
                    AnnouncementKind::Ack => None,
                };
                if let Some(event) = event {
                    let _ = self.events.send(event);
                }
                outcome.forwarded = self.forward(&announcement, announcement.ttl, self.config.fanout, from);
            }
            AnnouncementPayload::MessageDelivery(metadata) => {
                self.handle_message_delivery(from, &announcement, metadata, &mut outcome)
                    .await;
            }
            AnnouncementPayload::DeliveryAck(ack) => {
                if ack.original_sender_node == self.node_id {
                    outcome.ack_handled = self.dispatch_ack(ack.clone()).await;
                } else {
                    outcome.forwarded =
                        self.forward(&announcement, announcement.ttl, self.config.fanout, from);
                }
            }
        }
        outcome
    }

    async fn handle_message_delivery(
        &self,
        from: NodeId,
        announcement: &Announcement,
        metadata: &MessageDeliveryMetadata,
        outcome: &mut HandleOutcome,
    ) {
        let recipients: BTreeSet<&RecipientId> = metadata.recipient_ids.iter().collect();
        let (local, remote): (Vec<&RecipientId>, Vec<&RecipientId>) = {
            let users = self.local_users.read();
            recipients.into_iter().partition(|r| users.contains(*r))
        };

        if !local.is_empty() {
            outcome.consumed_locally = true;
            let local: Vec<RecipientId> = local.into_iter().cloned().collect();
            if self.consumed.insert(metadata.message_id) {
                info!(
                    message_id = %metadata.message_id,
                    from = %from,
                    local_recipients = local.len(),
                    "Message for local users received"
                );
                let _ = self.events.send(GossipEvent::IncomingMessage {
                    metadata: metadata.clone(),
                    local_recipients: local.clone(),
                    from,
                });
            }
            // One round of acks per announcement round, not per block.
            if metadata.ack_required
                && self
                    .acked
                    .insert((metadata.message_id, announcement.timestamp))
            {
                for recipient_id in local {
                    self.send_delivery_ack(DeliveryAck {
                        message_id: metadata.message_id,
                        recipient_id,
                        status: AckStatus::Delivered,
                        original_sender_node: announcement.node_id,
                    })
                    .await;
                    outcome.acks_sent += 1;
                }
            }
            if remote.is_empty() {
                return;
            }
        }

        let ttl = self.config.ttl_for(metadata.priority).min(announcement.ttl);
        outcome.forwarded =
            self.forward(announcement, ttl, self.config.fanout_for(metadata.priority), from);
    }

    /// Queue the next hop when `ttl > 0`.
    fn forward(&self, announcement: &Announcement, ttl: u32, fanout: u32, from: NodeId) -> bool {
        if ttl == 0 {
            trace!(block_id = %announcement.block_id, "TTL exhausted, not forwarding");
            return false;
        }
        self.enqueue(announcement.forwarded(ttl - 1), fanout, Some(from));
        true
    }

    async fn flush(&self) -> FlushReport {
        let queued = std::mem::take(&mut *self.queue.lock());
        let mut report = FlushReport::default();
        if queued.is_empty() {
            return report;
        }

        let peers: Vec<PeerInfo> = self
            .network
            .connected_peers()
            .into_iter()
            .filter(|p| p.node_id != self.node_id)
            .collect();
        let mut per_peer: BTreeMap<NodeId, Vec<Announcement>> = BTreeMap::new();
        for item in queued {
            let candidates: Vec<PeerInfo> = peers
                .iter()
                .filter(|p| Some(p.node_id) != item.exclude)
                .copied()
                .collect();
            let targets = select_peers(&candidates, item.fanout as usize);
            if targets.is_empty() {
                debug!(block_id = %item.announcement.block_id, "No eligible peers for announcement");
                report.undeliverable += 1;
                continue;
            }
            for target in targets {
                per_peer
                    .entry(target.node_id)
                    .or_default()
                    .push(item.announcement.clone());
            }
            report.announcements += 1;
        }

        let batch_size = (self.config.max_batch_size as usize).max(1);
        for (peer, announcements) in per_peer {
            for batch in announcements.chunks(batch_size) {
                match self.network.send_announcements(peer, batch.to_vec()).await {
                    Ok(()) => report.batches_sent += 1,
                    Err(e) => {
                        warn!(peer = %peer, size = batch.len(), error = %e, "Failed to send announcements");
                        report.errors.push(e);
                    }
                }
            }
        }
        debug!(
            announcements = report.announcements,
            batches = report.batches_sent,
            failures = report.errors.len(),
            "Flushed gossip queue"
        );
        report
    }
}

#[async_trait]
impl DeliveryAnnouncer for GossipService {
    async fn announce_message(
        &self,
        block_ids: &[BlockId],
        metadata: &MessageDeliveryMetadata,
    ) -> Result<(), GossipError> {
        self.inner.announce_message(block_ids, metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingPeerNetwork;
    use crate::config::{PriorityConfig, PriorityOverride};
    use shared_types::FixedTimeSource;
    use std::time::Duration;

    const LOCAL: NodeId = NodeId([0xAA; 32]);
    const ORIGIN: NodeId = NodeId([0xBB; 32]);
    const T0: u64 = 1_700_000_000_000;

    fn peer(i: u8) -> NodeId {
        NodeId::new([i; 32])
    }

    fn service_with(config: GossipConfig, peers: u8) -> (Arc<RecordingPeerNetwork>, GossipService) {
        let network = Arc::new(RecordingPeerNetwork::with_peer_count(peers));
        let service = GossipService::new(LOCAL, config, network.clone())
            .unwrap()
            .with_time_source(Arc::new(FixedTimeSource::new(T0)));
        (network, service)
    }

    fn service(peers: u8) -> (Arc<RecordingPeerNetwork>, GossipService) {
        service_with(GossipConfig::for_testing(), peers)
    }

    fn delivery(recipients: &[&str], priority: MessagePriority, ack_required: bool) -> MessageDeliveryMetadata {
        let message_id = MessageId::new(BlockId::new([0x11; 32]));
        MessageDeliveryMetadata {
            message_id,
            recipient_ids: recipients.iter().map(|s| s.to_string()).collect(),
            priority,
            block_ids: vec![BlockId::new([0x22; 32])],
            cbl_block_id: Some(message_id.block_id()),
            ack_required,
        }
    }

    fn delivery_announcement(metadata: MessageDeliveryMetadata, ttl: u32) -> Announcement {
        Announcement::message_delivery(BlockId::new([0x22; 32]), ORIGIN, T0 - 5, ttl, metadata)
    }

    #[derive(Default)]
    struct RecordingAckHandler {
        acks: Mutex<Vec<DeliveryAck>>,
    }

    #[async_trait]
    impl AckHandler for RecordingAckHandler {
        async fn on_delivery_ack(&self, ack: DeliveryAck) {
            self.acks.lock().push(ack);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GossipConfig {
            default_ttl: 0,
            ..GossipConfig::for_testing()
        };
        let network = Arc::new(RecordingPeerNetwork::default());
        assert!(matches!(
            GossipService::new(LOCAL, config, network),
            Err(GossipConfigError::InvalidField { field: "default_ttl", .. })
        ));
    }

    #[tokio::test]
    async fn test_plain_forwarding_ignores_priority_overrides() {
        let config = GossipConfig {
            priority: PriorityConfig {
                normal: PriorityOverride { fanout: 8, ttl: 9 },
                high: PriorityOverride { fanout: 9, ttl: 9 },
            },
            ..GossipConfig::for_testing()
        };
        let (network, service) = service_with(config, 10);
        let announcement =
            Announcement::block(AnnouncementKind::Add, BlockId::new([1u8; 32]), ORIGIN, T0, 3);

        let outcome = service.handle_announcement(peer(1), announcement).await;
        assert!(outcome.forwarded);
        let report = service.flush().await;
        assert_eq!(report.announcements, 1);

        let targets = network.recipients();
        assert_eq!(targets.len(), 3, "base fanout");
        assert!(!targets.contains(&peer(1)), "sender excluded");
        for (_, batch) in network.sent() {
            assert_eq!(batch[0].ttl, 2);
            assert_eq!(batch[0].node_id, ORIGIN);
        }
    }

    #[tokio::test]
    async fn test_plain_ttl_zero_is_surfaced_not_forwarded() {
        let (network, service) = service(4);
        let mut events = service.subscribe();
        let block_id = BlockId::new([1u8; 32]);

        let outcome = service
            .handle_announcement(
                peer(1),
                Announcement::block(AnnouncementKind::Remove, block_id, ORIGIN, T0, 0),
            )
            .await;
        assert!(!outcome.forwarded);
        assert_eq!(
            events.try_recv().unwrap(),
            GossipEvent::BlockRemoved {
                block_id,
                node_id: ORIGIN
            }
        );
        service.flush().await;
        assert!(network.sent().is_empty());
    }

    #[tokio::test]
    async fn test_plain_announcement_forwarded_exactly_ttl_times() {
        // A line of nodes, each knowing only the next.
        let mut announcement =
            Announcement::block(AnnouncementKind::Add, BlockId::new([3u8; 32]), ORIGIN, T0, 4);
        let mut previous = ORIGIN;
        let mut hops = 0;
        for i in 1..=10u8 {
            let network = Arc::new(RecordingPeerNetwork::new(vec![PeerInfo::new(peer(i + 1), 1.0)]));
            let node = GossipService::new(peer(i), GossipConfig::for_testing(), network.clone()).unwrap();
            node.handle_announcement(previous, announcement.clone()).await;
            node.flush().await;
            let sent = network.sent_to(&peer(i + 1));
            let Some(next) = sent.into_iter().next() else {
                break;
            };
            assert_eq!(next.ttl, announcement.ttl - 1);
            hops += 1;
            previous = peer(i);
            announcement = next;
        }
        assert_eq!(hops, 4);
    }

    #[tokio::test]
    async fn test_duplicates_dropped_regardless_of_ttl() {
        let (_, service) = service(4);
        let announcement =
            Announcement::block(AnnouncementKind::Add, BlockId::new([1u8; 32]), ORIGIN, T0, 3);
        assert!(!service.handle_announcement(peer(1), announcement.clone()).await.duplicate);
        assert!(service.handle_announcement(peer(2), announcement.clone()).await.duplicate);
        assert!(service.handle_announcement(peer(2), announcement.forwarded(1)).await.duplicate);
        assert_eq!(service.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_own_announcement_echo_dropped() {
        let (network, service) = service(2);
        service.announce_block(BlockId::new([5u8; 32]));
        service.flush().await;
        let echo = network.sent_to(&peer(1)).remove(0).forwarded(1);
        assert!(service.handle_announcement(peer(1), echo).await.duplicate);
    }

    #[tokio::test]
    async fn test_local_recipient_consumed_and_acked() {
        let (network, service) = service(4);
        service.add_local_user("bob");
        let mut events = service.subscribe();
        let metadata = delivery(&["bob"], MessagePriority::Normal, true);

        let outcome = service
            .handle_announcement(peer(1), delivery_announcement(metadata.clone(), 5))
            .await;
        assert!(outcome.consumed_locally);
        assert_eq!(outcome.acks_sent, 1);
        assert!(!outcome.forwarded, "every recipient is local");

        match events.try_recv().unwrap() {
            GossipEvent::IncomingMessage {
                metadata: m,
                local_recipients,
                from,
            } => {
                assert_eq!(m, metadata);
                assert_eq!(local_recipients, vec!["bob"]);
                assert_eq!(from, peer(1));
            }
            other => panic!("unexpected event {other:?}"),
        }

        service.flush().await;
        let sent = network.sent();
        assert_eq!(sent.len(), 3, "ack uses the base fanout");
        match &sent[0].1[0].payload {
            AnnouncementPayload::DeliveryAck(ack) => {
                assert_eq!(ack.message_id, metadata.message_id);
                assert_eq!(ack.recipient_id, "bob");
                assert_eq!(ack.status, AckStatus::Delivered);
                assert_eq!(ack.original_sender_node, ORIGIN);
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_ack_when_not_required() {
        let (_, service) = service(4);
        service.add_local_user("bob");
        let outcome = service
            .handle_announcement(
                peer(1),
                delivery_announcement(delivery(&["bob"], MessagePriority::Normal, false), 5),
            )
            .await;
        assert!(outcome.consumed_locally);
        assert_eq!(outcome.acks_sent, 0);
        assert_eq!(service.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_mixed_recipients_consumed_and_forwarded() {
        let (network, service) = service(10);
        service.add_local_user("bob");
        let metadata = delivery(&["bob", "carol"], MessagePriority::Normal, true);

        let outcome = service
            .handle_announcement(peer(1), delivery_announcement(metadata, 9))
            .await;
        assert!(outcome.consumed_locally);
        assert_eq!(outcome.acks_sent, 1);
        assert!(outcome.forwarded);

        service.flush().await;
        let forwarded: Vec<Announcement> = network
            .sent()
            .into_iter()
            .flat_map(|(_, batch)| batch)
            .filter(|a| a.message_delivery_metadata().is_some())
            .collect();
        // Normal override: fanout 5, ttl min(5, 9) - 1.
        assert_eq!(forwarded.len(), 5);
        assert!(forwarded.iter().all(|a| a.ttl == 4));
    }

    #[tokio::test]
    async fn test_non_local_forwarded_without_ack() {
        let (network, service) = service(10);
        service.add_local_user("bob");
        let mut events = service.subscribe();

        let outcome = service
            .handle_announcement(
                peer(1),
                delivery_announcement(delivery(&["carol"], MessagePriority::High, true), 4),
            )
            .await;
        assert!(!outcome.consumed_locally);
        assert_eq!(outcome.acks_sent, 0);
        assert!(outcome.forwarded);
        assert!(events.try_recv().is_err());

        service.flush().await;
        let sent = network.sent();
        // High override: fanout 7, ttl min(7, 4) - 1.
        assert_eq!(sent.len(), 7);
        assert!(!network.recipients().contains(&peer(1)));
        assert!(sent.iter().all(|(_, batch)| batch[0].ttl == 3));
    }

    #[tokio::test]
    async fn test_delivery_with_zero_ttl_not_forwarded() {
        let (_, service) = service(4);
        let outcome = service
            .handle_announcement(
                peer(1),
                delivery_announcement(delivery(&["carol"], MessagePriority::Normal, true), 0),
            )
            .await;
        assert!(!outcome.forwarded);
    }

    #[tokio::test]
    async fn test_multi_block_message_surfaced_and_acked_once() {
        let (_, service) = service(4);
        service.add_local_user("bob");
        let mut events = service.subscribe();
        let metadata = delivery(&["bob"], MessagePriority::Normal, true);

        let first = delivery_announcement(metadata.clone(), 5);
        let mut second = first.clone();
        second.block_id = BlockId::new([0x33; 32]);

        assert_eq!(service.handle_announcement(peer(1), first.clone()).await.acks_sent, 1);
        assert_eq!(service.handle_announcement(peer(1), second).await.acks_sent, 0);
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());

        // A retry round carries a new timestamp and is acked again.
        let mut retry = first;
        retry.timestamp += 30_000;
        let outcome = service.handle_announcement(peer(2), retry).await;
        assert_eq!(outcome.acks_sent, 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ack_for_local_node_reaches_handler() {
        let (_, service) = service(4);
        let handler = Arc::new(RecordingAckHandler::default());
        service.set_ack_handler(&handler);

        let ack = DeliveryAck {
            message_id: MessageId::new(BlockId::new([0x11; 32])),
            recipient_id: "bob".to_string(),
            status: AckStatus::Delivered,
            original_sender_node: LOCAL,
        };
        let outcome = service
            .handle_announcement(peer(1), Announcement::delivery_ack(peer(1), T0, 3, ack.clone()))
            .await;
        assert!(outcome.ack_handled);
        assert!(!outcome.forwarded);
        assert_eq!(*handler.acks.lock(), vec![ack]);
    }

    #[tokio::test]
    async fn test_ack_for_other_node_forwarded() {
        let (network, service) = service(10);
        let ack = DeliveryAck {
            message_id: MessageId::new(BlockId::new([0x11; 32])),
            recipient_id: "bob".to_string(),
            status: AckStatus::Read,
            original_sender_node: ORIGIN,
        };
        let outcome = service
            .handle_announcement(peer(1), Announcement::delivery_ack(peer(1), T0, 2, ack))
            .await;
        assert!(outcome.forwarded);
        service.flush().await;
        assert_eq!(network.recipients().len(), 3);
        assert!(network.sent().iter().all(|(_, b)| b[0].ttl == 1));
    }

    #[tokio::test]
    async fn test_dropped_handler_is_ignored() {
        let (_, service) = service(4);
        let handler = Arc::new(RecordingAckHandler::default());
        service.set_ack_handler(&handler);
        drop(handler);

        let ack = DeliveryAck {
            message_id: MessageId::new(BlockId::new([0x11; 32])),
            recipient_id: "bob".to_string(),
            status: AckStatus::Delivered,
            original_sender_node: LOCAL,
        };
        let outcome = service
            .handle_announcement(peer(1), Announcement::delivery_ack(peer(1), T0, 3, ack))
            .await;
        assert!(!outcome.ack_handled);
    }

    #[tokio::test]
    async fn test_ack_for_own_message_stays_local() {
        let (network, service) = service(4);
        let handler = Arc::new(RecordingAckHandler::default());
        service.set_ack_handler(&handler);
        service
            .send_delivery_ack(DeliveryAck {
                message_id: MessageId::new(BlockId::new([0x11; 32])),
                recipient_id: "bob".to_string(),
                status: AckStatus::Delivered,
                original_sender_node: LOCAL,
            })
            .await;
        assert_eq!(handler.acks.lock().len(), 1);
        service.flush().await;
        assert!(network.sent().is_empty());
    }

    #[tokio::test]
    async fn test_announce_message_uses_priority_and_queues_per_block() {
        let (network, service) = service(10);
        let mut metadata = delivery(&["carol"], MessagePriority::Low, true);
        let blocks = vec![BlockId::new([1u8; 32]), BlockId::new([2u8; 32])];
        metadata.block_ids = blocks.clone();

        service.announce_message(&blocks, &metadata).await.unwrap();
        assert_eq!(service.queue_len(), 2);
        assert!(network.sent().is_empty(), "normal priority waits for a flush");

        service.flush().await;
        // Low uses the normal override: 5 peers, both blocks in one batch each.
        let sent = network.sent();
        assert_eq!(sent.len(), 5);
        for (_, batch) in sent {
            assert_eq!(batch.len(), 2);
            assert!(batch.iter().all(|a| a.ttl == 5 && a.node_id == LOCAL));
            assert_eq!(batch[0].block_id, blocks[0]);
        }
    }

    #[tokio::test]
    async fn test_high_priority_flushes_immediately() {
        let (network, service) = service(10);
        let metadata = delivery(&["carol"], MessagePriority::High, true);
        service.announce_message(&[], &metadata).await.unwrap();
        assert_eq!(service.queue_len(), 0);

        let sent = network.sent();
        assert_eq!(sent.len(), 7);
        assert_eq!(sent[0].1[0].block_id, metadata.cbl_block_id.unwrap());
        assert_eq!(sent[0].1[0].ttl, 7);
    }

    #[tokio::test]
    async fn test_high_priority_network_failure_surfaces() {
        let (network, service) = service(1);
        network.fail_sends_to(peer(1));
        let metadata = delivery(&["carol"], MessagePriority::High, true);
        assert!(matches!(
            service.announce_message(&[], &metadata).await,
            Err(GossipError::Network(NetworkError::Unreachable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_announce_without_blocks_fails() {
        let (_, service) = service(4);
        let mut metadata = delivery(&["carol"], MessagePriority::Normal, true);
        metadata.cbl_block_id = None;
        assert!(matches!(
            service.announce_message(&[], &metadata).await,
            Err(GossipError::EmptyAnnouncement { .. })
        ));
    }

    #[tokio::test]
    async fn test_batches_respect_max_size() {
        let config = GossipConfig {
            max_batch_size: 2,
            ..GossipConfig::for_testing()
        };
        let (network, service) = service_with(config, 1);
        for i in 0..5u8 {
            service.announce_block(BlockId::new([i; 32]));
        }
        let report = service.flush().await;
        assert_eq!(report.batches_sent, 3);
        let sizes: Vec<usize> = network.sent().iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_send_failures_reported() {
        let (network, service) = service(3);
        network.fail_sends_to(peer(2));
        service.announce_block(BlockId::new([1u8; 32]));
        let report = service.flush().await;
        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.errors, vec![NetworkError::Unreachable { peer: peer(2) }]);
    }

    #[tokio::test]
    async fn test_no_peers_is_undeliverable() {
        let (_, service) = service(0);
        service.announce_block(BlockId::new([1u8; 32]));
        let report = service.flush().await;
        assert_eq!(report.undeliverable, 1);
        assert_eq!(report.batches_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_flushes_periodically() {
        let (network, service) = service(2);
        assert!(service.start());
        assert!(!service.start());

        service.announce_block(BlockId::new([1u8; 32]));
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(network.sent().len(), 2);

        assert!(service.stop());
        service.announce_block(BlockId::new([2u8; 32]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(network.sent().len(), 2);
        assert_eq!(service.queue_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_in_flight_flush() {
        let (network, service) = service(2);
        network.delay_sends(Duration::from_secs(1));
        assert!(service.start());

        service.announce_block(BlockId::new([1u8; 32]));
        // The first tick has drained the queue and is waiting on the network.
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(service.queue_len(), 0);
        assert!(service.stop());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(network.sent().len(), 2);
        assert_eq!(service.queue_len(), 0);
    }
}
