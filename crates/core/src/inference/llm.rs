//! LLM client abstraction and provider implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MediaPayload;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Http(error.to_string())
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Request for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (instructions for the model)
    pub system: Option<String>,
    /// User message
    pub prompt: String,
    /// Inline image sent alongside the prompt
    pub image: Option<MediaPayload>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            image: None,
            max_tokens: 8192,
            temperature: 0.4,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: MediaPayload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated text
    pub text: String,
    /// Token usage
    pub usage: LlmUsage,
    /// Model used
    pub model: String,
}

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name (e.g., "anthropic", "ollama")
    fn provider(&self) -> &str;

    /// Model name
    fn model(&self) -> &str;

    /// Send a completion request and get a text response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

// ============================================================================
// Anthropic Implementation
// ============================================================================

/// Anthropic API client.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            api_base: "https://api.anthropic.com".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Image { source: AnthropicImageSource },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

impl AnthropicRequest {
    fn build(model: &str, request: CompletionRequest) -> Self {
        let mut content = Vec::with_capacity(2);
        if let Some(image) = request.image {
            content.push(AnthropicContentBlock::Image {
                source: AnthropicImageSource {
                    source_type: "base64",
                    media_type: image.mime_type,
                    data: image.data,
                },
            });
        }
        content.push(AnthropicContentBlock::Text {
            text: request.prompt,
        });

        Self {
            model: model.to_string(),
            max_tokens: request.max_tokens,
            system: request.system,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let anthropic_request = AnthropicRequest::build(&self.model, request);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();

        if status != 200 {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(LlmError::Api { status, message });
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Json(e.to_string()))?;

        let text = anthropic_response
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            text,
            usage: LlmUsage {
                input_tokens: anthropic_response.usage.input_tokens,
                output_tokens: anthropic_response.usage.output_tokens,
            },
            model: anthropic_response.model,
        })
    }
}

// ============================================================================
// Ollama Implementation
// ============================================================================

/// Ollama API client for local inference.
///
/// Connects to a local Ollama server (default: http://localhost:11434).
/// No API key required. Image input needs a vision model such as llava.
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            api_base: "http://localhost:11434".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Base64 images without the data URL prefix.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    /// Number of tokens in the response
    #[serde(default)]
    eval_count: u32,
    /// Number of tokens in the prompt
    #[serde(default)]
    prompt_eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let ollama_request = OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt,
            system: request.system,
            images: request.image.map(|image| vec![image.data]).unwrap_or_default(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.api_base))
            .timeout(self.timeout)
            .header("content-type", "application/json")
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();

        if status != 200 {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(LlmError::Api { status, message });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Json(e.to_string()))?;

        Ok(CompletionResponse {
            text: ollama_response.response,
            usage: LlmUsage {
                input_tokens: ollama_response.prompt_eval_count,
                output_tokens: ollama_response.eval_count,
            },
            model: ollama_response.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> MediaPayload {
        MediaPayload {
            mime_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
        }
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("Grade this")
            .with_system("You are a strict math grader")
            .with_image(png())
            .with_max_tokens(100)
            .with_temperature(0.2);

        assert_eq!(request.prompt, "Grade this");
        assert_eq!(request.system.as_deref(), Some("You are a strict math grader"));
        assert!(request.image.is_some());
        assert_eq!(request.max_tokens, 100);
        assert_eq!(request.temperature, 0.2);
    }

    #[test]
    fn test_anthropic_request_puts_image_before_text() {
        let request = CompletionRequest::new("Grade this").with_image(png());
        let body = AnthropicRequest::build("claude", request);

        let json = serde_json::to_value(&body).unwrap();
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "Grade this");
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_anthropic_request_text_only() {
        let body = AnthropicRequest::build("claude", CompletionRequest::new("Summarize"));
        let json = serde_json::to_value(&body).unwrap();
        let content = json["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "text");
    }

    #[test]
    fn test_ollama_client_custom_base() {
        let client = OllamaClient::new("llava").with_api_base("http://remote-server:11434");
        assert_eq!(client.provider(), "ollama");
        assert_eq!(client.model(), "llava");
        assert_eq!(client.api_base, "http://remote-server:11434");
    }

    #[test]
    fn test_ollama_request_serialization() {
        let request = OllamaRequest {
            model: "llava".to_string(),
            prompt: "Hello".to_string(),
            system: Some("Be helpful".to_string()),
            images: vec!["AAAA".to_string()],
            stream: false,
            options: OllamaOptions {
                temperature: 0.5,
                num_predict: 100,
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"llava\""));
        assert!(json.contains("\"stream\":false"));
        assert!(json.contains("\"images\":[\"AAAA\"]"));
        assert!(json.contains("\"num_predict\":100"));
    }
}
