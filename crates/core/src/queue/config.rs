//! Task queue configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the in-process task queue and for dispatch retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum messages waiting for delivery.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Maximum deliveries handled at the same time.
    #[serde(default = "default_max_concurrent_dispatches")]
    pub max_concurrent_dispatches: usize,

    /// Deliveries per message before it is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first redelivery (seconds).
    #[serde(default = "default_min_backoff")]
    pub min_backoff_secs: u64,

    /// Upper bound on any redelivery delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Growth factor between consecutive redelivery delays.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    /// Attempts the dispatcher makes to enqueue each subtask.
    #[serde(default = "default_enqueue_attempts")]
    pub enqueue_attempts: u32,

    /// Pause between enqueue attempts (milliseconds).
    #[serde(default = "default_enqueue_backoff")]
    pub enqueue_backoff_ms: u64,
}

fn default_capacity() -> usize {
    1000
}

fn default_max_concurrent_dispatches() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_backoff() -> u64 {
    10
}

fn default_max_backoff() -> u64 {
    300
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_enqueue_attempts() -> u32 {
    3
}

fn default_enqueue_backoff() -> u64 {
    200
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_concurrent_dispatches: default_max_concurrent_dispatches(),
            max_attempts: default_max_attempts(),
            min_backoff_secs: default_min_backoff(),
            max_backoff_secs: default_max_backoff(),
            backoff_multiplier: default_multiplier(),
            enqueue_attempts: default_enqueue_attempts(),
            enqueue_backoff_ms: default_enqueue_backoff(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.max_concurrent_dispatches, 10);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.min_backoff_secs, 10);
        assert_eq!(config.max_backoff_secs, 300);
        assert_eq!(config.enqueue_attempts, 3);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            max_attempts = 5
            min_backoff_secs = 2
        "#;
        let config: QueueConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.min_backoff_secs, 2);
        assert_eq!(config.max_concurrent_dispatches, 10);
        assert_eq!(config.backoff_multiplier, 2.0);
    }
}
