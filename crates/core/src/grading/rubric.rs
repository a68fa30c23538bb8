//! Drafts grading criteria for a past exam, to paste in as a rubric override.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::inference::{InferenceClient, InferenceRequest, InferenceRole};

use super::prompts::rubric_research_prompt;
use super::types::GradingError;
use super::GradingConfig;

/// Sampling temperature for criteria drafts; a summary, not a verdict.
pub const RUBRIC_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RubricSuggestionRequest {
    #[serde(default)]
    pub university: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub problem_type: Option<String>,
}

pub struct RubricAdvisor {
    inference: Arc<dyn InferenceClient>,
    config: GradingConfig,
}

impl RubricAdvisor {
    pub fn new(inference: Arc<dyn InferenceClient>, config: GradingConfig) -> Self {
        Self { inference, config }
    }

    /// Plain-text criteria summary for the requested exam.
    pub async fn suggest(&self, request: &RubricSuggestionRequest) -> Result<String, GradingError> {
        let university = request.university.trim();
        let year = request.year.trim();
        if university.is_empty() || year.is_empty() {
            return Err(GradingError::Validation(
                "university and year are required".to_string(),
            ));
        }

        info!("Drafting grading criteria for {} {}", university, year);

        let prompt = rubric_research_prompt(
            university,
            year,
            request.problem_type.as_deref(),
            &self.config,
        );
        let inference_request = InferenceRequest::text(
            InferenceRole::RubricResearch,
            prompt.instructions,
            prompt.context,
        )
        .with_temperature(RUBRIC_TEMPERATURE);

        let output = self.inference.infer(inference_request).await?;
        Ok(output.into_text())
    }
}
