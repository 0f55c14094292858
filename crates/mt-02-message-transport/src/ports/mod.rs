//! Ports for the message transport subsystem.
//!
//! Outbound collaborators (`BlockStore`, `ChecksumProvider`,
//! `MessageMetadataStore`, `TimeSource`) are owned by the lower crates.

pub mod inbound;
