//! # Routing Configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Router configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Budget for one recipient's status transition.
    pub routing_timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routing_timeout_ms: 5_000,
        }
    }
}

impl RoutingConfig {
    pub fn for_testing() -> Self {
        Self {
            routing_timeout_ms: 50,
        }
    }

    /// Defaults with `MT_ROUTING_TIMEOUT_MS` applied when it parses.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            routing_timeout_ms: env::var("MT_ROUTING_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.routing_timeout_ms),
        }
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms.max(1))
    }
}
