//! # Transport Errors
//!
//! Validation errors are surfaced before any write and never retried.
//! Storage errors are retried, then escalate after cleanup. Every retrieval
//! failure collapses into `MessageNotFound` with the underlying cause kept as
//! the error source.

use mt_01_block_chunking::{BlockStoreError, CodecError};
use shared_types::{BlockId, IdParseError, MetadataError};
use thiserror::Error;

/// Underlying collaborator failure wrapped by a `TransportError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportCause {
    #[error(transparent)]
    Block(#[from] BlockStoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    InvalidId(#[from] IdParseError),

    /// Stored bytes no longer hash to their address.
    #[error("Block {id} failed checksum verification")]
    ChecksumMismatch { id: BlockId },

    /// Content blocks hold fewer bytes than the header's original length.
    #[error("Content truncated: header declares {expected} bytes, blocks hold {actual}")]
    Truncated { expected: u64, actual: u64 },
}

/// Message transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Options or content rejected before any write.
    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: &'static str, reason: String },

    /// A store write failed after retries.
    #[error("Storage failed during {operation}: {source}")]
    StorageFailed {
        operation: &'static str,
        source: TransportCause,
    },

    /// The message could not be resolved or reconstructed.
    #[error("Message not found: {message_id}: {source}")]
    MessageNotFound {
        message_id: String,
        source: TransportCause,
    },
}

impl TransportError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        TransportError::ValidationFailed {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(operation: &'static str, source: impl Into<TransportCause>) -> Self {
        TransportError::StorageFailed {
            operation,
            source: source.into(),
        }
    }

    pub(crate) fn not_found(message_id: impl Into<String>, source: impl Into<TransportCause>) -> Self {
        TransportError::MessageNotFound {
            message_id: message_id.into(),
            source: source.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TransportError::ValidationFailed { .. })
    }
}
