//! Routing domain: strategy selection, loop detection and results.

pub mod errors;
pub mod strategy;

pub use errors::{RoutingError, FORWARDING_LOOP_DETECTED};
pub use strategy::{
    determine_strategy, extend_forwarding_path, is_forwarding_loop, RoutingResult,
    RoutingStrategy,
};
