//! # Delivery Tracking (mt-04)
//!
//! Gossip propagation of announced messages and the per-recipient
//! acknowledgment state machine that drives retries.
//!
//! ## Architecture Role
//!
//! ```text
//! [Message Routing (3)] ──track_delivery──→ [DeliveryTracker] ──announce_message──→ [GossipService]
//!                                                  ↑                                       │
//!                                                  └──────── on_delivery_ack ──────────────┤
//!                                                                                          ↓
//!                                                                                   [PeerNetwork]
//! ```
//!
//! ## Recipient State Machine
//!
//! | From | To | Trigger |
//! |------|----|---------|
//! | ANNOUNCED | DELIVERED | `delivered` ack |
//! | DELIVERED | READ | `read` ack |
//! | ANNOUNCED | BOUNCED | `bounced` ack |
//! | ANNOUNCED | FAILED | retries exhausted |
//!
//! Every other transition is ignored.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod events;
pub mod gossip;
pub mod ports;
pub mod timer;
pub mod tracker;

pub use adapters::RecordingPeerNetwork;
pub use config::{
    DeliveryTrackerConfig, GossipConfig, GossipConfigError, PriorityConfig, PriorityOverride,
};
pub use domain::{
    backoff_delay_ms, select_peers, AckStatus, Announcement, AnnouncementKind,
    AnnouncementPayload, DeliveryAck, MessageDeliveryMetadata, PeerInfo, PendingDelivery,
    RecipientStatus,
};
pub use events::{DeliveryEvent, GossipError, GossipEvent, NetworkError};
pub use gossip::{FlushReport, GossipService, HandleOutcome};
pub use ports::inbound::AckHandler;
pub use ports::outbound::{DeliveryAnnouncer, PeerNetwork};
pub use timer::RecurringTask;
pub use tracker::{AckOutcome, DeliveryTracker, RetrySummary};
