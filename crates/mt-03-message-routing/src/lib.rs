//! # Message Routing (mt-03)
//!
//! Chooses a delivery strategy and moves each recipient of a stored message
//! to `IN_TRANSIT`, bounded by a per-recipient timeout.
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Strategy | Empty recipient list is gossip, anything else direct |
//! | 2 | Partial success | One success is a result, zero successes is `DeliveryFailed` |
//! | 3 | Loop safety | A path containing the local node is never routed |
//! | 4 | Dedup | Duplicate recipients are attempted once |

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::RoutingConfig;
pub use domain::{
    determine_strategy, extend_forwarding_path, is_forwarding_loop, RoutingError, RoutingResult,
    RoutingStrategy,
};
pub use ports::inbound::MessageRoutingApi;
pub use service::MessageRouter;
