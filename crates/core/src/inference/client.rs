//! Inference client backed by an LLM provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::parse::{parse_structured, strip_code_fence};
use super::{
    AnthropicClient, CompletionRequest, InferenceClient, InferenceConfig, InferenceError,
    InferenceOutput, InferenceProvider, InferenceRequest, LlmClient, OllamaClient,
};
use crate::metrics;

/// Longest slice of raw output kept in an error message.
const MAX_ERROR_EXCERPT: usize = 200;

/// Adapts an [`LlmClient`] to the [`InferenceClient`] seam.
pub struct LlmInferenceClient<C: LlmClient> {
    llm: C,
    max_tokens: u32,
    temperature: f32,
}

impl<C: LlmClient> LlmInferenceClient<C> {
    pub fn new(llm: C, max_tokens: u32, temperature: f32) -> Self {
        Self {
            llm,
            max_tokens,
            temperature,
        }
    }
}

#[async_trait]
impl<C: LlmClient + 'static> InferenceClient for LlmInferenceClient<C> {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceOutput, InferenceError> {
        let role = request.role.as_str();
        let mut completion = CompletionRequest::new(request.context)
            .with_system(request.instructions)
            .with_max_tokens(self.max_tokens)
            .with_temperature(request.temperature.unwrap_or(self.temperature));
        if let Some(media) = request.media {
            completion = completion.with_image(media);
        }

        let started = Instant::now();
        let result = self.llm.complete(completion).await;
        metrics::INFERENCE_DURATION
            .with_label_values(&[role])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::INFERENCE_REQUESTS
                    .with_label_values(&[role, "error"])
                    .inc();
                warn!(role, provider = self.llm.provider(), "Inference call failed: {}", e);
                return Err(e.into());
            }
        };

        let provider = self.llm.provider();
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "input"])
            .inc_by(response.usage.input_tokens as u64);
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "output"])
            .inc_by(response.usage.output_tokens as u64);

        debug!(
            role,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Inference call completed"
        );

        let output = if response.text.trim().is_empty() {
            Err(InferenceError::EmptyResponse)
        } else if request.expect_structured {
            parse_structured(&response.text)
                .map(InferenceOutput::Structured)
                .ok_or_else(|| InferenceError::Unstructured(excerpt(&response.text)))
        } else {
            Ok(InferenceOutput::Text(strip_code_fence(&response.text)))
        };

        let status = if output.is_ok() { "success" } else { "error" };
        metrics::INFERENCE_REQUESTS
            .with_label_values(&[role, status])
            .inc();

        output
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_ERROR_EXCERPT) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_string(),
    }
}

/// Build the configured inference client.
pub fn create_inference_client(
    config: &InferenceConfig,
) -> Result<Arc<dyn InferenceClient>, InferenceError> {
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider {
        InferenceProvider::Anthropic => {
            let api_key = config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    InferenceError::NotConfigured("anthropic requires an api_key".to_string())
                })?;
            let mut llm = AnthropicClient::new(api_key, &config.model).with_timeout(timeout);
            if let Some(ref api_base) = config.api_base {
                llm = llm.with_api_base(api_base);
            }
            Ok(Arc::new(LlmInferenceClient::new(
                llm,
                config.max_tokens,
                config.temperature,
            )))
        }
        InferenceProvider::Ollama => {
            let mut llm = OllamaClient::new(&config.model).with_timeout(timeout);
            if let Some(ref api_base) = config.api_base {
                llm = llm.with_api_base(api_base);
            }
            Ok(Arc::new(LlmInferenceClient::new(
                llm,
                config.max_tokens,
                config.temperature,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{CompletionResponse, InferenceRole, LlmError, LlmUsage, MediaPayload};
    use std::sync::Mutex;

    /// Scripted LLM that records what it was asked.
    struct ScriptedLlm {
        reply: Result<String, u16>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    text: text.clone(),
                    usage: LlmUsage {
                        input_tokens: 10,
                        output_tokens: 5,
                    },
                    model: "scripted-1".to_string(),
                }),
                Err(status) => Err(LlmError::Api {
                    status: *status,
                    message: "overloaded".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_structured_output_parsed() {
        let client = LlmInferenceClient::new(
            ScriptedLlm::replying("```json\n{\"score_deduction\": 10}\n```"),
            8192,
            0.4,
        );
        let media = MediaPayload::from_data_url("data:image/png;base64,AAAA");
        let request =
            InferenceRequest::structured(InferenceRole::Correctness, "grade", "question")
                .with_media(media.clone());

        let output = client.infer(request).await.unwrap();
        assert_eq!(
            output,
            InferenceOutput::Structured(serde_json::json!({"score_deduction": 10}))
        );

        let seen = client.llm.seen.lock().unwrap();
        assert_eq!(seen[0].system.as_deref(), Some("grade"));
        assert_eq!(seen[0].image, media);
        assert_eq!(seen[0].temperature, 0.4);
    }

    #[tokio::test]
    async fn test_unstructured_output_is_error() {
        let client =
            LlmInferenceClient::new(ScriptedLlm::replying("I cannot read this image."), 100, 0.4);
        let request = InferenceRequest::structured(InferenceRole::Reasoning, "sys", "ctx");

        let result = client.infer(request).await;
        assert!(matches!(result, Err(InferenceError::Unstructured(_))));
    }

    #[tokio::test]
    async fn test_text_output_strips_fence() {
        let client = LlmInferenceClient::new(
            ScriptedLlm::replying("```html\n<div>92</div>\n```"),
            100,
            0.4,
        );
        let request =
            InferenceRequest::text(InferenceRole::Report, "sys", "ctx").with_temperature(0.9);

        let output = client.infer(request).await.unwrap();
        assert_eq!(output, InferenceOutput::Text("<div>92</div>".to_string()));
        assert_eq!(client.llm.seen.lock().unwrap()[0].temperature, 0.9);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let client = LlmInferenceClient::new(ScriptedLlm::failing(529), 100, 0.4);
        let request = InferenceRequest::structured(InferenceRole::Feedback, "sys", "ctx");

        let result = client.infer(request).await;
        assert!(matches!(
            result,
            Err(InferenceError::Provider(LlmError::Api { status: 529, .. }))
        ));
    }

    #[tokio::test]
    async fn test_empty_response_is_error() {
        let client = LlmInferenceClient::new(ScriptedLlm::replying("   "), 100, 0.4);
        let request = InferenceRequest::text(InferenceRole::Report, "sys", "ctx");
        assert!(matches!(
            client.infer(request).await,
            Err(InferenceError::EmptyResponse)
        ));
    }

    #[test]
    fn test_factory_requires_anthropic_key() {
        let config = InferenceConfig::default();
        assert!(matches!(
            create_inference_client(&config),
            Err(InferenceError::NotConfigured(_))
        ));

        let config = InferenceConfig {
            provider: InferenceProvider::Ollama,
            ..Default::default()
        };
        assert!(create_inference_client(&config).is_ok());
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(500);
        let short = excerpt(&long);
        assert_eq!(short.len(), MAX_ERROR_EXCERPT + 3);
        assert_eq!(excerpt(" short "), "short");
    }
}
