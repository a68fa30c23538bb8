use super::{types::Config, ConfigError};
use crate::inference::InferenceProvider;

/// Upper bound on the finalization claim TTL (one day).
const MAX_CLAIM_TTL_SECS: u64 = 86_400;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let queue = &config.queue;
    if queue.capacity == 0 {
        return Err(invalid("queue.capacity must be at least 1"));
    }
    if queue.max_concurrent_dispatches == 0 {
        return Err(invalid("queue.max_concurrent_dispatches must be at least 1"));
    }
    if queue.max_attempts == 0 {
        return Err(invalid("queue.max_attempts must be at least 1"));
    }
    if queue.enqueue_attempts == 0 {
        return Err(invalid("queue.enqueue_attempts must be at least 1"));
    }
    if queue.max_backoff_secs < queue.min_backoff_secs {
        return Err(invalid(
            "queue.max_backoff_secs cannot be smaller than queue.min_backoff_secs",
        ));
    }
    if queue.backoff_multiplier.is_nan() || queue.backoff_multiplier < 1.0 {
        return Err(invalid("queue.backoff_multiplier must be >= 1.0"));
    }

    let inference = &config.inference;
    if inference.model.trim().is_empty() {
        return Err(invalid("inference.model cannot be empty"));
    }
    if inference.provider == InferenceProvider::Anthropic
        && inference
            .api_key
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
    {
        return Err(invalid("inference.api_key is required for the anthropic provider"));
    }
    if inference.timeout_secs == 0 {
        return Err(invalid("inference.timeout_secs must be at least 1"));
    }

    let claim_ttl = config.grading.finalize_claim_ttl_secs;
    if claim_ttl == 0 {
        return Err(invalid("grading.finalize_claim_ttl_secs must be at least 1"));
    }
    if claim_ttl > MAX_CLAIM_TTL_SECS {
        return Err(invalid("grading.finalize_claim_ttl_secs cannot exceed 86400"));
    }
    // The report call gets half the claim; it must fit a full inference call.
    if claim_ttl < inference.timeout_secs.saturating_mul(2) {
        return Err(invalid(
            "grading.finalize_claim_ttl_secs must be at least twice inference.timeout_secs",
        ));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
