//! # Shared Types Crate
//!
//! Types shared by every message-transport subsystem.
//!
//! ## Contents
//!
//! - **entities**: content addresses (`BlockId`, `MessageId`), `NodeId`,
//!   `BlockSize` classes, message priority and encryption scheme
//! - **metadata**: `MessageRecord`, `DeliveryStatus` and the
//!   `MessageMetadataStore` port consumed by transport, routing and tracking
//! - **memory**: in-memory `MessageMetadataStore` adapter
//! - **time**: `TimeSource` port for wall-clock timestamps
//!
//! ## Design Rules
//!
//! - **No ambient state**: collaborators are passed explicitly, never looked
//!   up through a global registry.
//! - **Opaque ids**: every id renders as lowercase hex so it can be embedded
//!   in a URL-like locator.

pub mod entities;
pub mod errors;
pub mod memory;
pub mod metadata;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use memory::InMemoryMessageMetadataStore;
pub use metadata::*;
pub use time::{FixedTimeSource, SystemTimeSource, TimeSource};
