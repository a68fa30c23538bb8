//! Redelivery backoff.

use std::time::Duration;

use super::QueueConfig;

/// Exponential backoff for redelivering a failed message.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first redelivery.
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base_delay: Duration::from_secs(config.min_backoff_secs),
            multiplier: config.backoff_multiplier,
            max_delay: Duration::from_secs(config.max_backoff_secs),
        }
    }

    /// Delay after `attempts` failed deliveries (1-indexed):
    /// `base_delay * multiplier^(attempts - 1)`, capped at `max_delay`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
