//! Inference: the external AI capability behind grading and reports.

mod client;
mod config;
mod llm;
mod parse;
mod types;

pub use client::{create_inference_client, LlmInferenceClient};
pub use config::{InferenceConfig, InferenceProvider};
pub use llm::{
    AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage,
    OllamaClient,
};
pub use parse::{parse_structured, strip_code_fence};
pub use types::{
    InferenceClient, InferenceError, InferenceOutput, InferenceRequest, InferenceRole,
    MediaPayload,
};
