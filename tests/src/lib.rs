//! # Message-Transport Test Suite
//!
//! End-to-end flows that wire every subsystem together over an in-process
//! gossip mesh.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mesh.rs    # In-process PeerNetwork and fully wired test nodes
//!     └── flows.rs   # create → route → track → gossip → ack flows
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p mt-tests
//! RUST_LOG=debug cargo test -p mt-tests integration:: -- --nocapture
//! ```

pub mod integration;
