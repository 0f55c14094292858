//! # End-to-End Delivery Flows
//!
//! ```text
//! create_message → route_message → track_delivery → announce_message
//!        ↓                                                 ↓ gossip hops
//!   BlockStore + MessageRecord                    recipient node consumes
//!                                                          ↓ delivered ack
//!                     DeliveryEvent::Delivered ← handle_ack
//! ```

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::time::timeout;

    use mt_02_message_transport::MessageTransportApi;
    use mt_03_message_routing::{extend_forwarding_path, MessageRoutingApi, RoutingStrategy};
    use mt_04_delivery_tracking::{
        AckStatus, DeliveryAck, DeliveryEvent, DeliveryTrackerConfig, GossipConfig, GossipEvent,
        RecipientStatus,
    };
    use shared_types::{DeliveryStatus, MessagePriority, NodeId};

    use crate::integration::mesh::{init_tracing, pump, Mesh, TestNode};

    // =========================================================================
    // DELIVERY ACROSS THE MESH
    // =========================================================================

    #[tokio::test]
    async fn test_two_node_delivery_completes() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &["alice"]);
        let bob = TestNode::new(&mesh, 2, &["bob"]);
        mesh.connect(alice.id, bob.id);

        let mut delivered = alice.tracker.subscribe();
        let mut incoming = bob.gossip.subscribe();

        let content = vec![0x5Au8; 1_300];
        let (created, routed) = alice.send(&content, &["bob"], MessagePriority::Normal).await;
        assert_eq!(routed.strategy, RoutingStrategy::Direct);
        assert_eq!(
            alice.metadata_status(&created.message_id, "bob").await,
            DeliveryStatus::InTransit
        );

        pump(&[&alice, &bob]).await;

        match incoming.try_recv().unwrap() {
            GossipEvent::IncomingMessage {
                metadata,
                local_recipients,
                from,
            } => {
                assert_eq!(metadata.message_id, created.message_id);
                assert_eq!(metadata.block_ids, created.content_block_ids);
                assert_eq!(local_recipients, vec!["bob"]);
                assert_eq!(from, alice.id);
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(
            delivered.try_recv().unwrap(),
            DeliveryEvent::Delivered {
                message_id: created.message_id,
                recipients: vec!["bob".to_string()],
            }
        );
        assert_eq!(alice.tracker.pending_count(), 0);

        let record = alice
            .transport
            .get_message_metadata(&created.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status_of("bob"), Some(DeliveryStatus::Delivered));
        assert!(record.acknowledgments.contains_key("bob"));
        assert_eq!(
            alice
                .transport
                .get_message_content(&created.message_id)
                .await
                .unwrap(),
            content
        );
    }

    #[tokio::test]
    async fn test_relay_forwards_delivery_and_ack() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &["alice"]);
        let relay = TestNode::new(&mesh, 2, &[]);
        let carol = TestNode::new(&mesh, 3, &["carol"]);
        mesh.connect_line(&[alice.id, relay.id, carol.id]);

        let mut delivered = alice.tracker.subscribe();
        let mut relay_events = relay.gossip.subscribe();

        let (created, _) = alice.send(b"via relay", &["carol"], MessagePriority::High).await;
        pump(&[&alice, &relay, &carol]).await;

        assert!(
            relay_events.try_recv().is_err(),
            "relay has no local recipient"
        );
        assert!(matches!(
            delivered.try_recv().unwrap(),
            DeliveryEvent::Delivered { message_id, .. } if message_id == created.message_id
        ));
        assert_eq!(
            alice.metadata_status(&created.message_id, "carol").await,
            DeliveryStatus::Delivered
        );
    }

    #[tokio::test]
    async fn test_partial_acks_keep_tracking() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &[]);
        let bob = TestNode::new(&mesh, 2, &["bob"]);
        mesh.connect(alice.id, bob.id);
        let mut delivered = alice.tracker.subscribe();

        // "dave" lives nowhere on this mesh.
        let (created, _) = alice
            .send(b"hello both", &["bob", "dave"], MessagePriority::Normal)
            .await;
        pump(&[&alice, &bob]).await;

        assert!(delivered.try_recv().is_err());
        let pending = alice.tracker.pending_delivery(&created.message_id).unwrap();
        assert_eq!(pending.recipient_statuses["bob"], RecipientStatus::Delivered);
        assert_eq!(pending.recipient_statuses["dave"], RecipientStatus::Announced);

        // A read receipt travels back the same way.
        bob.gossip
            .send_delivery_ack(DeliveryAck {
                message_id: created.message_id,
                recipient_id: "bob".to_string(),
                status: AckStatus::Read,
                original_sender_node: alice.id,
            })
            .await;
        pump(&[&alice, &bob]).await;
        assert_eq!(
            alice.metadata_status(&created.message_id, "bob").await,
            DeliveryStatus::Read
        );
    }

    // =========================================================================
    // RETRY AND EXHAUSTION
    // =========================================================================

    #[tokio::test]
    async fn test_unreachable_recipient_fails_after_retries() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &[]);
        let bob = TestNode::new(&mesh, 2, &["bob"]);
        mesh.connect(alice.id, bob.id);
        let mut events = alice.tracker.subscribe();
        let mut bob_events = bob.gossip.subscribe();

        let (created, _) = alice
            .send(b"retry me", &["bob", "dave"], MessagePriority::Normal)
            .await;
        pump(&[&alice, &bob]).await;

        let config = alice.tracker.config().clone();
        let mut reannounced = 0;
        let mut failure = None;
        for _ in 0..=config.max_retries {
            let due = alice
                .tracker
                .pending_delivery(&created.message_id)
                .unwrap()
                .next_retry_at;
            alice.clock.set(due);
            let summary = alice.tracker.check_retries().await;
            reannounced += summary.reannounced.len();
            pump(&[&alice, &bob]).await;
            if !summary.failed.is_empty() {
                failure = Some(events.try_recv().unwrap());
                break;
            }
        }

        assert_eq!(reannounced, config.max_retries as usize);
        assert_eq!(
            failure,
            Some(DeliveryEvent::Failed {
                message_id: created.message_id,
                failed_recipients: vec!["dave".to_string()],
            })
        );
        assert!(events.try_recv().is_err());
        assert_eq!(alice.tracker.pending_count(), 0);
        assert_eq!(
            alice.metadata_status(&created.message_id, "dave").await,
            DeliveryStatus::Failed
        );
        assert_eq!(
            alice.metadata_status(&created.message_id, "bob").await,
            DeliveryStatus::Delivered
        );

        // Bob saw every retry round but surfaced the message once.
        assert!(matches!(
            bob_events.try_recv().unwrap(),
            GossipEvent::IncomingMessage { .. }
        ));
        assert!(bob_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lost_ack_recovered_by_reannouncement() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &[]);
        let bob = TestNode::new(&mesh, 2, &["bob"]);
        let mut delivered = alice.tracker.subscribe();

        // Announce before the link exists: the first round is lost.
        let (created, _) = alice.send(b"late", &["bob"], MessagePriority::Normal).await;
        assert_eq!(alice.gossip.flush().await.undeliverable, 1);
        assert_eq!(alice.tracker.pending_count(), 1);
        mesh.connect(alice.id, bob.id);

        alice.clock.advance(DeliveryTrackerConfig::for_testing().initial_timeout_ms);
        let summary = alice.tracker.check_retries().await;
        assert_eq!(summary.reannounced, vec![created.message_id]);
        pump(&[&alice, &bob]).await;

        assert!(matches!(
            delivered.try_recv().unwrap(),
            DeliveryEvent::Delivered { .. }
        ));
    }

    // =========================================================================
    // ROUTING
    // =========================================================================

    #[tokio::test]
    async fn test_broadcast_is_gossiped_and_untracked() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &[]);

        let (created, routed) = alice.send(b"to everyone", &[], MessagePriority::Low).await;
        assert_eq!(routed.strategy, RoutingStrategy::Gossip);
        assert!(alice.tracker.pending_delivery(&created.message_id).is_none());
    }

    #[tokio::test]
    async fn test_forwarding_loop_is_rejected() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &[]);
        let (created, _) = alice.send(b"loop", &["bob"], MessagePriority::Normal).await;

        let path = extend_forwarding_path(&[NodeId::new([7u8; 32])], alice.id);
        let result = alice
            .router
            .forward_message(&created.message_id, &["bob".to_string()], &path)
            .await
            .unwrap();
        assert_eq!(result.failed_recipients, vec!["bob"]);
        assert_eq!(result.errors["bob"], "forwarding loop detected");
    }

    // =========================================================================
    // PLAIN GOSSIP
    // =========================================================================

    #[tokio::test]
    async fn test_plain_announcement_travels_ttl_hops() {
        init_tracing();
        let mesh = Mesh::new();
        let gossip = GossipConfig {
            default_ttl: 3,
            ..GossipConfig::for_testing()
        };
        let nodes: Vec<TestNode> = (1..=7u8)
            .map(|seed| {
                TestNode::with_configs(
                    &mesh,
                    seed,
                    &[],
                    gossip.clone(),
                    DeliveryTrackerConfig::for_testing(),
                )
            })
            .collect();
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        mesh.connect_line(&ids);
        let mut receivers: Vec<_> = nodes.iter().map(|n| n.gossip.subscribe()).collect();

        nodes[0].gossip.announce_block(block_id_of(b"plain block"));
        let refs: Vec<&TestNode> = nodes.iter().collect();
        pump(&refs).await;

        // Origin sends ttl 3; three forwards reach nodes 2..=5.
        let reached: Vec<bool> = receivers
            .iter_mut()
            .map(|rx| {
                matches!(
                    rx.try_recv(),
                    Ok(GossipEvent::BlockAnnounced { node_id, .. }) if node_id == ids[0]
                )
            })
            .collect();
        assert_eq!(reached, vec![false, true, true, true, true, false, false]);
    }

    // =========================================================================
    // TIMER-DRIVEN
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_started_services_deliver_without_manual_flush() {
        init_tracing();
        let mesh = Mesh::new();
        let alice = TestNode::new(&mesh, 1, &[]);
        let bob = TestNode::new(&mesh, 2, &["bob"]);
        mesh.connect(alice.id, bob.id);
        for node in [&alice, &bob] {
            assert!(node.gossip.start());
            assert!(node.tracker.start());
        }
        let mut delivered = alice.tracker.subscribe();

        let (created, _) = alice.send(b"timers", &["bob"], MessagePriority::Normal).await;
        let event = timeout(Duration::from_secs(5), delivered.recv())
            .await
            .expect("delivery within timeout")
            .unwrap();
        assert_eq!(event.message_id(), created.message_id);

        for node in [&alice, &bob] {
            assert!(node.gossip.stop());
            assert!(node.tracker.stop());
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn block_id_of(seed: &[u8]) -> shared_types::BlockId {
        use mt_01_block_chunking::{ChecksumProvider, Sha256ChecksumProvider};
        shared_types::BlockId::new(Sha256ChecksumProvider.checksum(seed))
    }

    impl TestNode {
        async fn metadata_status(
            &self,
            message_id: &shared_types::MessageId,
            recipient: &str,
        ) -> DeliveryStatus {
            self.transport
                .get_message_metadata(message_id)
                .await
                .unwrap()
                .unwrap()
                .status_of(recipient)
                .unwrap()
        }
    }
}
