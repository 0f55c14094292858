//! Re-announcement backoff.

use crate::config::DeliveryTrackerConfig;

/// Delay before the check following retry number `retry_count`:
/// `min(initial * multiplier^retry_count, max_backoff)`.
pub fn backoff_delay_ms(config: &DeliveryTrackerConfig, retry_count: u32) -> u64 {
    let factor = u64::from(config.backoff_multiplier).saturating_pow(retry_count);
    config
        .initial_timeout_ms
        .saturating_mul(factor)
        .min(config.max_backoff_ms)
}
