//! # Gossip and Delivery Tracking Configuration
//!
//! Every fanout and TTL must be a positive integer. Negative and fractional
//! values never deserialize into the unsigned fields; zero is rejected by
//! `validate()`.

use serde::{Deserialize, Serialize};
use shared_types::MessagePriority;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GossipConfigError {
    #[error("Invalid value {value} for {field}: must be a positive integer")]
    InvalidField { field: &'static str, value: u64 },

    #[error("Config parse error: {0}")]
    Parse(String),
}

/// Fanout and TTL applied to one priority class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityOverride {
    pub fanout: u32,
    pub ttl: u32,
}

/// Per-priority overrides. `Low` uses `normal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityConfig {
    pub normal: PriorityOverride,
    pub high: PriorityOverride,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            normal: PriorityOverride { fanout: 5, ttl: 5 },
            high: PriorityOverride { fanout: 7, ttl: 7 },
        }
    }
}

/// Gossip propagation configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Peers per hop for plain announcements and acks.
    pub fanout: u32,
    /// Hop budget for plain announcements and acks.
    pub default_ttl: u32,
    pub batch_interval_ms: u64,
    /// Announcements per network send.
    pub max_batch_size: u32,
    /// Message delivery announcements use these instead of the base values.
    pub priority: PriorityConfig,
    /// Entries kept by the duplicate-suppression caches.
    pub seen_cache_size: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            default_ttl: 3,
            batch_interval_ms: 1_000,
            max_batch_size: 100,
            priority: PriorityConfig::default(),
            seen_cache_size: 10_000,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn positive(field: &'static str, value: u64) -> Result<(), GossipConfigError> {
    if value == 0 {
        return Err(GossipConfigError::InvalidField { field, value });
    }
    Ok(())
}

impl GossipConfig {
    pub fn for_testing() -> Self {
        Self {
            batch_interval_ms: 10,
            seen_cache_size: 1_000,
            ..Self::default()
        }
    }

    /// Defaults with `MT_GOSSIP_*` overrides. Call `validate()` on the result.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            fanout: env_parse("MT_GOSSIP_FANOUT").unwrap_or(d.fanout),
            default_ttl: env_parse("MT_GOSSIP_DEFAULT_TTL").unwrap_or(d.default_ttl),
            batch_interval_ms: env_parse("MT_GOSSIP_BATCH_INTERVAL_MS")
                .unwrap_or(d.batch_interval_ms),
            max_batch_size: env_parse("MT_GOSSIP_MAX_BATCH_SIZE").unwrap_or(d.max_batch_size),
            priority: PriorityConfig {
                normal: PriorityOverride {
                    fanout: env_parse("MT_GOSSIP_NORMAL_FANOUT").unwrap_or(d.priority.normal.fanout),
                    ttl: env_parse("MT_GOSSIP_NORMAL_TTL").unwrap_or(d.priority.normal.ttl),
                },
                high: PriorityOverride {
                    fanout: env_parse("MT_GOSSIP_HIGH_FANOUT").unwrap_or(d.priority.high.fanout),
                    ttl: env_parse("MT_GOSSIP_HIGH_TTL").unwrap_or(d.priority.high.ttl),
                },
            },
            seen_cache_size: env_parse("MT_GOSSIP_SEEN_CACHE_SIZE").unwrap_or(d.seen_cache_size),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, GossipConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| GossipConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GossipConfigError> {
        positive("fanout", self.fanout.into())?;
        positive("default_ttl", self.default_ttl.into())?;
        positive("priority.normal.fanout", self.priority.normal.fanout.into())?;
        positive("priority.normal.ttl", self.priority.normal.ttl.into())?;
        positive("priority.high.fanout", self.priority.high.fanout.into())?;
        positive("priority.high.ttl", self.priority.high.ttl.into())?;
        positive("batch_interval_ms", self.batch_interval_ms)?;
        positive("max_batch_size", self.max_batch_size.into())?;
        positive("seen_cache_size", self.seen_cache_size as u64)?;
        Ok(())
    }

    fn override_for(&self, priority: MessagePriority) -> PriorityOverride {
        match priority {
            MessagePriority::High => self.priority.high,
            MessagePriority::Normal | MessagePriority::Low => self.priority.normal,
        }
    }

    pub fn fanout_for(&self, priority: MessagePriority) -> u32 {
        self.override_for(priority).fanout
    }

    pub fn ttl_for(&self, priority: MessagePriority) -> u32 {
        self.override_for(priority).ttl
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms.max(1))
    }
}

/// Delivery tracker timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryTrackerConfig {
    /// Wait before the first re-announcement.
    pub initial_timeout_ms: u64,
    pub backoff_multiplier: u32,
    pub max_backoff_ms: u64,
    /// Re-announcements before the remaining recipients fail.
    pub max_retries: u32,
    /// Period of the retry check timer.
    pub retry_check_interval_ms: u64,
}

impl Default for DeliveryTrackerConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: 30_000,
            backoff_multiplier: 2,
            max_backoff_ms: 240_000,
            max_retries: 5,
            retry_check_interval_ms: 5_000,
        }
    }
}

impl DeliveryTrackerConfig {
    pub fn for_testing() -> Self {
        Self {
            initial_timeout_ms: 100,
            max_backoff_ms: 800,
            retry_check_interval_ms: 20,
            ..Self::default()
        }
    }

    /// Defaults with `MT_DELIVERY_*` overrides.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            initial_timeout_ms: env_parse("MT_DELIVERY_INITIAL_TIMEOUT_MS")
                .unwrap_or(d.initial_timeout_ms),
            backoff_multiplier: env_parse("MT_DELIVERY_BACKOFF_MULTIPLIER")
                .unwrap_or(d.backoff_multiplier),
            max_backoff_ms: env_parse("MT_DELIVERY_MAX_BACKOFF_MS").unwrap_or(d.max_backoff_ms),
            max_retries: env_parse("MT_DELIVERY_MAX_RETRIES").unwrap_or(d.max_retries),
            retry_check_interval_ms: env_parse("MT_DELIVERY_RETRY_CHECK_INTERVAL_MS")
                .unwrap_or(d.retry_check_interval_ms),
        }
    }

    pub fn validate(&self) -> Result<(), GossipConfigError> {
        positive("initial_timeout_ms", self.initial_timeout_ms)?;
        positive("backoff_multiplier", self.backoff_multiplier.into())?;
        positive("max_backoff_ms", self.max_backoff_ms)?;
        positive("retry_check_interval_ms", self.retry_check_interval_ms)?;
        Ok(())
    }

    pub fn retry_check_interval(&self) -> Duration {
        Duration::from_millis(self.retry_check_interval_ms.max(1))
    }
}
