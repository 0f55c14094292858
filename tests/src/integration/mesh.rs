//! # In-Process Gossip Mesh
//!
//! A `PeerNetwork` that delivers batches straight into the target node's
//! `GossipService`, plus `TestNode`, a node with every subsystem wired the
//! way an embedding application would wire them.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Once, Weak};
use tracing_subscriber::EnvFilter;

use mt_01_block_chunking::InMemoryBlockStore;
use mt_02_message_transport::{
    CreatedMessage, MessageOptions, MessageTransportApi, MessageTransportService, TransportConfig,
};
use mt_03_message_routing::{MessageRouter, MessageRoutingApi, RoutingConfig, RoutingResult};
use mt_04_delivery_tracking::{
    Announcement, DeliveryTracker, DeliveryTrackerConfig, GossipConfig, GossipService,
    MessageDeliveryMetadata, NetworkError, PeerInfo, PeerNetwork,
};
use shared_types::{
    FixedTimeSource, InMemoryMessageMetadataStore, MessagePriority, NodeId, RecipientId,
};

/// Start of the shared test clock.
pub const T0: u64 = 1_700_000_000_000;

/// Flush rounds before `pump` gives up on a non-draining mesh.
const MAX_PUMP_ROUNDS: usize = 64;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once. Filter via `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Registry of gossip endpoints and the links between them.
#[derive(Default)]
pub struct Mesh {
    nodes: RwLock<HashMap<NodeId, Weak<GossipService>>>,
    links: RwLock<HashMap<NodeId, Vec<NodeId>>>,
}

impl Mesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, node: &Arc<GossipService>) {
        self.nodes
            .write()
            .insert(node.node_id(), Arc::downgrade(node));
    }

    /// Bidirectional link.
    pub fn connect(&self, a: NodeId, b: NodeId) {
        let mut links = self.links.write();
        links.entry(a).or_default().push(b);
        links.entry(b).or_default().push(a);
    }

    /// Link consecutive nodes.
    pub fn connect_line(&self, ids: &[NodeId]) {
        for pair in ids.windows(2) {
            self.connect(pair[0], pair[1]);
        }
    }

    pub fn network_for(self: &Arc<Self>, local: NodeId) -> Arc<MeshNetwork> {
        Arc::new(MeshNetwork {
            local,
            mesh: Arc::clone(self),
        })
    }
}

/// One node's view of the mesh.
pub struct MeshNetwork {
    local: NodeId,
    mesh: Arc<Mesh>,
}

#[async_trait]
impl PeerNetwork for MeshNetwork {
    fn connected_peers(&self) -> Vec<PeerInfo> {
        self.mesh
            .links
            .read()
            .get(&self.local)
            .map(|peers| peers.iter().map(|p| PeerInfo::new(*p, 1.0)).collect())
            .unwrap_or_default()
    }

    async fn send_announcements(
        &self,
        peer: NodeId,
        batch: Vec<Announcement>,
    ) -> Result<(), NetworkError> {
        let target = self.mesh.nodes.read().get(&peer).and_then(Weak::upgrade);
        let Some(target) = target else {
            return Err(NetworkError::Unreachable { peer });
        };
        for announcement in batch {
            target.handle_announcement(self.local, announcement).await;
        }
        Ok(())
    }
}

/// A fully wired node sharing one manually driven clock.
pub struct TestNode {
    pub id: NodeId,
    pub clock: Arc<FixedTimeSource>,
    pub store: Arc<InMemoryBlockStore>,
    pub metadata: Arc<InMemoryMessageMetadataStore>,
    pub transport: MessageTransportService,
    pub router: MessageRouter,
    pub gossip: Arc<GossipService>,
    pub tracker: Arc<DeliveryTracker>,
}

impl TestNode {
    pub fn new(mesh: &Arc<Mesh>, seed: u8, local_users: &[&str]) -> Self {
        Self::with_configs(
            mesh,
            seed,
            local_users,
            GossipConfig::for_testing(),
            DeliveryTrackerConfig::for_testing(),
        )
    }

    pub fn with_configs(
        mesh: &Arc<Mesh>,
        seed: u8,
        local_users: &[&str],
        gossip_config: GossipConfig,
        tracker_config: DeliveryTrackerConfig,
    ) -> Self {
        let id = NodeId::new([seed; 32]);
        let clock = Arc::new(FixedTimeSource::new(T0));
        let transport_config = TransportConfig::for_testing();
        let store = Arc::new(InMemoryBlockStore::new(transport_config.block_size));
        let metadata = Arc::new(InMemoryMessageMetadataStore::new());

        let transport = MessageTransportService::new(transport_config, id, store.clone())
            .expect("valid transport config")
            .with_metadata_store(metadata.clone())
            .with_time_source(clock.clone());
        let router = MessageRouter::new(RoutingConfig::for_testing(), id, metadata.clone());

        let gossip = Arc::new(
            GossipService::new(id, gossip_config, mesh.network_for(id))
                .expect("valid gossip config")
                .with_time_source(clock.clone()),
        );
        for user in local_users {
            gossip.add_local_user(*user);
        }
        mesh.register(&gossip);

        let tracker = Arc::new(
            DeliveryTracker::new(tracker_config, gossip.clone())
                .with_metadata_store(metadata.clone())
                .with_time_source(clock.clone()),
        );
        gossip.set_ack_handler(&tracker);

        Self {
            id,
            clock,
            store,
            metadata,
            transport,
            router,
            gossip,
            tracker,
        }
    }

    /// Create, route, track and announce a message.
    pub async fn send(
        &self,
        content: &[u8],
        recipients: &[&str],
        priority: MessagePriority,
    ) -> (CreatedMessage, RoutingResult) {
        let options = MessageOptions::new("email", "alice")
            .with_recipients(recipients.iter().copied())
            .with_priority(priority);
        let created = self
            .transport
            .create_message(content, &options)
            .await
            .expect("message created");

        let recipient_ids: Vec<RecipientId> = recipients.iter().map(|r| r.to_string()).collect();
        let routed = self
            .router
            .route_message(&created.message_id, &recipient_ids)
            .await
            .expect("at least one recipient routed");

        let delivery = MessageDeliveryMetadata {
            message_id: created.message_id,
            recipient_ids,
            priority,
            block_ids: created.content_block_ids.clone(),
            cbl_block_id: Some(created.message_id.block_id()),
            ack_required: true,
        };
        self.tracker.track_delivery(
            created.message_id,
            created.content_block_ids.clone(),
            delivery.clone(),
        );
        self.gossip
            .announce_message(&created.content_block_ids, &delivery)
            .await
            .expect("announced");
        (created, routed)
    }
}

/// Flush every node until no queue holds anything.
pub async fn pump(nodes: &[&TestNode]) {
    for _ in 0..MAX_PUMP_ROUNDS {
        if nodes.iter().all(|n| n.gossip.queue_len() == 0) {
            return;
        }
        for node in nodes {
            node.gossip.flush().await;
        }
    }
    panic!("gossip mesh did not drain in {MAX_PUMP_ROUNDS} rounds");
}
