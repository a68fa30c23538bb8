//! Inference provider configuration.

use serde::{Deserialize, Serialize};

/// Inference provider type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceProvider {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// Local Ollama instance.
    Ollama,
}

/// Inference client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub provider: InferenceProvider,
    /// Model name/identifier. Must accept image input for graded submissions.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key (required for anthropic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.4
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: InferenceProvider::default(),
            model: default_model(),
            api_key: None,
            api_base: None,
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InferenceConfig::default();
        assert_eq!(config.provider, InferenceProvider::Anthropic);
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.temperature, 0.4);
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_deserialize_ollama() {
        let toml = r#"
            provider = "ollama"
            model = "llava"
            api_base = "http://gpu-box:11434"
        "#;
        let config: InferenceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.provider, InferenceProvider::Ollama);
        assert_eq!(config.api_base.as_deref(), Some("http://gpu-box:11434"));
        assert!(config.api_key.is_none());
    }
}
