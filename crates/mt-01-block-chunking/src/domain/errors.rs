//! # Domain Errors
//!
//! Error types for header coding and the block store contract.

use shared_types::BlockId;
use thiserror::Error;

/// CBL header encoding/decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer does not hold a well-formed header.
    #[error("Header malformed at offset {offset}: {reason}")]
    HeaderMalformed { offset: usize, reason: String },

    /// A variable-length field does not fit its length prefix.
    #[error("Header field {field} too long: {len} (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl CodecError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        CodecError::HeaderMalformed {
            offset,
            reason: reason.into(),
        }
    }
}

/// Errors raised by a `BlockStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockStoreError {
    /// No block stored under this address.
    #[error("Block not found: {id}")]
    NotFound { id: BlockId },

    /// A block with this address already exists.
    #[error("Block already exists: {id}")]
    AlreadyExists { id: BlockId },

    /// Block length does not match the store's fixed block size.
    #[error("Block size mismatch for {id}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        id: BlockId,
        expected: usize,
        actual: usize,
    },

    /// Backend I/O failure.
    #[error("Block store I/O error during {operation}: {message}")]
    Io {
        operation: &'static str,
        message: String,
    },
}
