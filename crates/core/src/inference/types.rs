//! Inference seam: requests, results, and the client trait.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::LlmError;
use crate::ticket::SubtaskKind;

static DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^data:([^;,]+);base64,(.+)$").unwrap());

/// What an inference call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceRole {
    Correctness,
    Reasoning,
    Feedback,
    /// Final report rendering after aggregation.
    Report,
    /// Drafting grading criteria on request.
    RubricResearch,
}

impl InferenceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceRole::Correctness => "correctness",
            InferenceRole::Reasoning => "reasoning",
            InferenceRole::Feedback => "feedback",
            InferenceRole::Report => "report",
            InferenceRole::RubricResearch => "rubric_research",
        }
    }
}

impl From<SubtaskKind> for InferenceRole {
    fn from(kind: SubtaskKind) -> Self {
        match kind {
            SubtaskKind::Correctness => InferenceRole::Correctness,
            SubtaskKind::Reasoning => InferenceRole::Reasoning,
            SubtaskKind::Feedback => InferenceRole::Feedback,
        }
    }
}

/// Inline media decoded from a `data:<mime>;base64,<data>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime_type: String,
    /// Base64 payload, still encoded.
    pub data: String,
}

impl MediaPayload {
    /// Parse a base64 data URL. Anything else yields `None`.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let captures = DATA_URL.captures(url.trim())?;
        Some(Self {
            mime_type: captures.get(1)?.as_str().to_string(),
            data: captures.get(2)?.as_str().to_string(),
        })
    }
}

/// One call to the inference service.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub role: InferenceRole,
    /// System-level instructions.
    pub instructions: String,
    /// Problem context and task description.
    pub context: String,
    pub media: Option<MediaPayload>,
    /// Whether the caller needs a JSON object back.
    pub expect_structured: bool,
    /// Overrides the configured temperature for this call.
    pub temperature: Option<f32>,
}

impl InferenceRequest {
    pub fn structured(
        role: InferenceRole,
        instructions: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            role,
            instructions: instructions.into(),
            context: context.into(),
            media: None,
            expect_structured: true,
            temperature: None,
        }
    }

    pub fn text(
        role: InferenceRole,
        instructions: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            expect_structured: false,
            ..Self::structured(role, instructions, context)
        }
    }

    pub fn with_media(mut self, media: Option<MediaPayload>) -> Self {
        self.media = media;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Result of a successful inference call.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    Structured(Value),
    Text(String),
}

impl InferenceOutput {
    /// Structured output as-is; text wrapped as `{"text": ...}`.
    pub fn into_value(self) -> Value {
        match self {
            InferenceOutput::Structured(value) => value,
            InferenceOutput::Text(text) => json!({ "text": text }),
        }
    }

    /// Text output as-is; structured output serialized.
    pub fn into_text(self) -> String {
        match self {
            InferenceOutput::Structured(value) => value.to_string(),
            InferenceOutput::Text(text) => text,
        }
    }
}

/// Errors from the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The provider call failed.
    #[error("inference provider error: {0}")]
    Provider(#[from] LlmError),

    /// Structured output was requested but none could be parsed.
    #[error("inference returned unstructured output: {0}")]
    Unstructured(String),

    /// The provider answered with nothing.
    #[error("inference returned an empty response")]
    EmptyResponse,

    /// The client cannot be built from the given configuration.
    #[error("inference not configured: {0}")]
    NotConfigured(String),
}

/// External AI capability used by workers and the aggregator.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceOutput, InferenceError>;
}
