//! Mock inference client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use serde_json::json;

use crate::inference::{
    InferenceClient, InferenceError, InferenceOutput, InferenceRequest, InferenceRole, LlmError,
};

/// A recorded inference call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedInference {
    pub role: InferenceRole,
    pub instructions: String,
    pub context: String,
    /// MIME type of the attached media, if any.
    pub media_type: Option<String>,
    pub temperature: Option<f32>,
    pub timestamp: Instant,
}

/// Mock implementation of the InferenceClient trait.
///
/// Every role has a sensible default answer (a clean, correct submission),
/// which tests override per role. Failures can be injected per role, either
/// permanently or for the next N calls.
///
/// # Example
///
/// ```rust,ignore
/// use gradeflow_core::inference::{InferenceOutput, InferenceRole};
/// use gradeflow_core::testing::MockInferenceClient;
///
/// let inference = MockInferenceClient::new();
/// inference
///     .set_response(InferenceRole::Reasoning, InferenceOutput::Structured(json!({"score_deduction": 10})))
///     .await;
/// inference.fail_role(InferenceRole::Report, "model overloaded").await;
///
/// // ... run the workflow ...
/// assert_eq!(inference.call_count(InferenceRole::Report).await, 1);
/// ```
pub struct MockInferenceClient {
    responses: Arc<RwLock<HashMap<InferenceRole, InferenceOutput>>>,
    /// Role -> (remaining failures, message). `None` fails forever.
    failures: Arc<RwLock<HashMap<InferenceRole, (Option<u32>, String)>>>,
    calls: Arc<RwLock<Vec<RecordedInference>>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl std::fmt::Debug for MockInferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockInferenceClient")
            .field("responses", &"<responses>")
            .field("failures", &"<failures>")
            .field("calls", &"<calls>")
            .finish()
    }
}

impl Default for MockInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Default answer for a role when nothing was configured.
    pub fn default_response(role: InferenceRole) -> InferenceOutput {
        match role {
            InferenceRole::Correctness => InferenceOutput::Structured(json!({
                "valid": true,
                "is_correct_problem": true,
                "latex": "x^2",
                "errors": [],
                "score_deduction": 0
            })),
            InferenceRole::Reasoning => InferenceOutput::Structured(json!({
                "structure": "Valid",
                "gaps": [],
                "score_deduction": 0
            })),
            InferenceRole::Feedback => InferenceOutput::Structured(json!({
                "is_correct_problem": true,
                "strengths": "Clear setup",
                "weaknesses": "None",
                "study_points": "Keep practising",
                "overall_eval": "Excellent",
                "text": "Great work!",
                "tone": "encouraging"
            })),
            InferenceRole::Report => InferenceOutput::Text("<div>report</div>".to_string()),
            InferenceRole::RubricResearch => {
                InferenceOutput::Text("[Evaluation Standards]: rigor".to_string())
            }
        }
    }

    /// Set the answer returned for a role.
    pub async fn set_response(&self, role: InferenceRole, output: InferenceOutput) {
        self.responses.write().await.insert(role, output);
    }

    /// Make every call for a role fail.
    pub async fn fail_role(&self, role: InferenceRole, message: &str) {
        self.failures
            .write()
            .await
            .insert(role, (None, message.to_string()));
    }

    /// Make the next `times` calls for a role fail.
    pub async fn fail_next(&self, role: InferenceRole, times: u32, message: &str) {
        self.failures
            .write()
            .await
            .insert(role, (Some(times), message.to_string()));
    }

    /// Stop injecting failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Delay every call, to widen race windows.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// All recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedInference> {
        self.calls.read().await.clone()
    }

    /// Number of calls made for a role.
    pub async fn call_count(&self, role: InferenceRole) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| call.role == role)
            .count()
    }

    async fn take_failure(&self, role: InferenceRole) -> Option<String> {
        let mut failures = self.failures.write().await;
        let (remaining, message) = failures.get(&role).cloned()?;
        match remaining {
            None => Some(message),
            Some(n) if n <= 1 => {
                failures.remove(&role);
                (n == 1).then_some(message)
            }
            Some(n) => {
                failures.insert(role, (Some(n - 1), message.clone()));
                Some(message)
            }
        }
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceOutput, InferenceError> {
        self.calls.write().await.push(RecordedInference {
            role: request.role,
            instructions: request.instructions.clone(),
            context: request.context.clone(),
            media_type: request.media.as_ref().map(|m| m.mime_type.clone()),
            temperature: request.temperature,
            timestamp: Instant::now(),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.take_failure(request.role).await {
            return Err(InferenceError::Provider(LlmError::Api {
                status: 500,
                message,
            }));
        }

        let configured = self.responses.read().await.get(&request.role).cloned();
        Ok(configured.unwrap_or_else(|| Self::default_response(request.role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: InferenceRole) -> InferenceRequest {
        InferenceRequest::structured(role, "system", "context")
    }

    #[tokio::test]
    async fn test_default_and_configured_responses() {
        let mock = MockInferenceClient::new();
        let output = mock.infer(request(InferenceRole::Reasoning)).await.unwrap();
        assert_eq!(output.into_value()["structure"], "Valid");

        mock.set_response(
            InferenceRole::Reasoning,
            InferenceOutput::Structured(json!({"score_deduction": 10})),
        )
        .await;
        let output = mock.infer(request(InferenceRole::Reasoning)).await.unwrap();
        assert_eq!(output.into_value()["score_deduction"], 10);
        assert_eq!(mock.call_count(InferenceRole::Reasoning).await, 2);
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let mock = MockInferenceClient::new();
        mock.fail_next(InferenceRole::Feedback, 2, "overloaded").await;

        assert!(mock.infer(request(InferenceRole::Feedback)).await.is_err());
        assert!(mock.infer(request(InferenceRole::Feedback)).await.is_err());
        assert!(mock.infer(request(InferenceRole::Feedback)).await.is_ok());
        assert!(mock.infer(request(InferenceRole::Correctness)).await.is_ok());
    }
}
