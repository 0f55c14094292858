//! # Message Transport (mt-02)
//!
//! Turns a payload into stored blocks plus a CBL header block, and reverses
//! the process on retrieval.
//!
//! ## Architecture Role
//!
//! ```text
//! caller ──create_message──→ [Message Transport (2)] ──split/encode──→ [Block Chunking (1)]
//!                                   │                                        │
//!                                   ↓ MessageRecord                          ↓ put/get/delete
//!                          [MessageMetadataStore]                      [BlockStore]
//! ```
//!
//! ## Create Flow
//!
//! 1. Validate options and content size (no writes on failure)
//! 2. Encode the header up front, indexing it when it exceeds one block
//! 3. Store each content block with retry; already-present blocks are reused
//! 4. Store any header segments, then the zero-padded root header block; its
//!    address is the `MessageId`
//! 5. Store a `MessageRecord` when a metadata store is configured
//!
//! Any storage failure deletes the blocks this call wrote, then surfaces
//! `StorageFailed`.

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use config::TransportConfig;
pub use domain::{
    retry_with_backoff, CreatedMessage, MessageOptions, RetryPolicy, TransportCause,
    TransportError,
};
pub use ports::inbound::MessageTransportApi;
pub use service::MessageTransportService;
