use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::grading::GradingConfig;
use crate::inference::{InferenceConfig, InferenceProvider};
use crate::queue::QueueConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("gradeflow.db")
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Problem catalog configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// TOML file with `[[problems]]` entries. Without it every lookup
    /// resolves to the placeholder problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub queue: QueueConfig,
    pub inference: SanitizedInferenceConfig,
    pub grading: GradingConfig,
    pub catalog: CatalogConfig,
}

/// Inference config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedInferenceConfig {
    pub provider: InferenceProvider,
    pub model: String,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let inference = &config.inference;
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            logging: config.logging.clone(),
            queue: config.queue.clone(),
            inference: SanitizedInferenceConfig {
                provider: inference.provider,
                model: inference.model.clone(),
                api_key_configured: inference.api_key.is_some(),
                api_base: inference.api_base.clone(),
                timeout_secs: inference.timeout_secs,
                max_tokens: inference.max_tokens,
                temperature: inference.temperature,
            },
            grading: config.grading.clone(),
            catalog: config.catalog.clone(),
        }
    }
}
