//! Grading configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by workers and the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Language the learner-facing feedback is written in.
    #[serde(default = "default_feedback_language")]
    pub feedback_language: String,

    /// Persona the feedback is written as.
    #[serde(default = "default_tutor_name")]
    pub tutor_name: String,

    /// How long a finalization claim blocks other finalizers (seconds).
    /// Past this, a claim is treated as abandoned and may be taken over.
    #[serde(default = "default_claim_ttl")]
    pub finalize_claim_ttl_secs: u64,
}

fn default_feedback_language() -> String {
    "Korean".to_string()
}

fn default_tutor_name() -> String {
    "Dr. Han".to_string()
}

fn default_claim_ttl() -> u64 {
    300
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            feedback_language: default_feedback_language(),
            tutor_name: default_tutor_name(),
            finalize_claim_ttl_secs: default_claim_ttl(),
        }
    }
}
