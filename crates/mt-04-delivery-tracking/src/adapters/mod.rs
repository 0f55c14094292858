//! Adapters for the gossip ports.

pub mod memory;

pub use memory::RecordingPeerNetwork;
