//! # Message Transport Configuration
//!
//! Defaults suit a single node. `from_env` applies `MT_*` overrides on top of
//! the defaults; unparseable values are ignored.

use serde::{Deserialize, Serialize};
use shared_types::BlockSize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{RetryPolicy, TransportError};
use mt_01_block_chunking::HEADER_FIXED_LEN;

/// Default cap on a single backoff delay.
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 5_000;

/// Message transport configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Block size class content is split with. Must match the block store.
    pub block_size: BlockSize,

    /// Largest accepted content length in bytes.
    pub max_message_size_threshold: usize,

    pub max_recipients_per_message: usize,

    /// Tries per store write, the first included.
    pub storage_retry_attempts: u32,

    /// Delay after the first failed write; doubles per retry.
    pub storage_retry_base_delay_ms: u64,

    /// Cap on any single retry delay.
    pub max_retry_delay_ms: u64,

    /// Prefix of `CreatedMessage::retrieval_url`.
    pub retrieval_url_prefix: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            block_size: BlockSize::Small,
            max_message_size_threshold: 256 * 1024,
            max_recipients_per_message: 100,
            storage_retry_attempts: 3,
            storage_retry_base_delay_ms: 100,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            retrieval_url_prefix: "cbl:".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl TransportConfig {
    /// Small blocks and near-zero backoff.
    pub fn for_testing() -> Self {
        Self {
            block_size: BlockSize::Message,
            max_message_size_threshold: 64 * 1024,
            max_recipients_per_message: 16,
            storage_retry_attempts: 3,
            storage_retry_base_delay_ms: 1,
            max_retry_delay_ms: 10,
            retrieval_url_prefix: "cbl:".to_string(),
        }
    }

    /// Defaults with environment overrides.
    ///
    /// # Environment Variables
    ///
    /// - `MT_BLOCK_SIZE`: block size in bytes (512, 1024, 4096, 1048576, 67108864)
    /// - `MT_MAX_MESSAGE_SIZE`: content size limit in bytes
    /// - `MT_MAX_RECIPIENTS`: recipient limit per message
    /// - `MT_STORAGE_RETRY_ATTEMPTS`: tries per store write
    /// - `MT_STORAGE_RETRY_BASE_DELAY_MS`: first backoff delay
    /// - `MT_MAX_RETRY_DELAY_MS`: backoff cap
    /// - `MT_RETRIEVAL_URL_PREFIX`: locator prefix
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            block_size: env_parse::<usize>("MT_BLOCK_SIZE")
                .and_then(BlockSize::from_bytes)
                .unwrap_or(defaults.block_size),
            max_message_size_threshold: env_parse("MT_MAX_MESSAGE_SIZE")
                .unwrap_or(defaults.max_message_size_threshold),
            max_recipients_per_message: env_parse("MT_MAX_RECIPIENTS")
                .unwrap_or(defaults.max_recipients_per_message),
            storage_retry_attempts: env_parse("MT_STORAGE_RETRY_ATTEMPTS")
                .unwrap_or(defaults.storage_retry_attempts),
            storage_retry_base_delay_ms: env_parse("MT_STORAGE_RETRY_BASE_DELAY_MS")
                .unwrap_or(defaults.storage_retry_base_delay_ms),
            max_retry_delay_ms: env_parse("MT_MAX_RETRY_DELAY_MS")
                .unwrap_or(defaults.max_retry_delay_ms),
            retrieval_url_prefix: env::var("MT_RETRIEVAL_URL_PREFIX")
                .unwrap_or(defaults.retrieval_url_prefix),
        }
    }

    /// Parse a JSON document; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, TransportError> {
        let config: Self = serde_json::from_str(json).map_err(|e| TransportError::ValidationFailed {
            field: "config",
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.storage_retry_attempts == 0 {
            return Err(TransportError::validation(
                "storage_retry_attempts",
                "must be at least 1",
            ));
        }
        if self.max_retry_delay_ms < self.storage_retry_base_delay_ms {
            return Err(TransportError::validation(
                "max_retry_delay_ms",
                "must not be below storage_retry_base_delay_ms",
            ));
        }
        // An index over two segments must fit, or indexing never shrinks a header.
        if self.block_size.bytes() < HEADER_FIXED_LEN + 2 * 32 {
            return Err(TransportError::validation(
                "block_size",
                "too small to hold a header index",
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.storage_retry_attempts,
            Duration::from_millis(self.storage_retry_base_delay_ms),
            Duration::from_millis(self.max_retry_delay_ms),
        )
    }
}
