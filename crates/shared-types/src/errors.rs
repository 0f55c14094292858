//! # Error Types
//!
//! Errors shared across subsystems: id parsing and the metadata store contract.

use thiserror::Error;

use crate::entities::MessageId;

/// Failure to parse a hex-encoded identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// Input is not valid hex.
    #[error("Invalid hex id {input:?}: {reason}")]
    InvalidHex { input: String, reason: String },

    /// Input decoded to the wrong number of bytes.
    #[error("Invalid id length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Errors raised by a `MessageMetadataStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// No record exists for this message.
    #[error("Message metadata not found: {message_id}")]
    MessageNotFound { message_id: MessageId },

    /// The record exists but does not list this recipient.
    #[error("Recipient {recipient_id} is not a recipient of message {message_id}")]
    UnknownRecipient {
        message_id: MessageId,
        recipient_id: String,
    },

    /// Backend failure (I/O, connection, injected fault).
    #[error("Metadata backend error during {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}
