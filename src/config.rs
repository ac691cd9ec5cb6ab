//! Configuration loader and validator for the draft generation service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub model: Model,
    pub wordpress: WordPress,
    #[serde(default)]
    pub prompts: Prompts,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub poll_interval_ms: u64,
    pub soft_qc_retries: usize,
}

/// Language-model API settings (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Model {
    pub api_base_url: String,
    pub api_key: String,
    pub name: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// WordPress REST API target and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordPress {
    pub base_url: String,
    pub username: String,
    pub app_password: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_secs: f64,
    pub convert_markdown: bool,
}

/// Prompt template overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prompts {
    #[serde(default)]
    pub template_path: Option<String>,
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }

    if cfg.model.api_base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("model.api_base_url must be non-empty"));
    }
    if cfg.model.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("model.api_key must be non-empty"));
    }
    if cfg.model.name.trim().is_empty() {
        return Err(ConfigError::Invalid("model.name must be non-empty"));
    }

    if cfg.wordpress.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("wordpress.base_url must be non-empty"));
    }
    if cfg.wordpress.username.trim().is_empty() {
        return Err(ConfigError::Invalid("wordpress.username must be non-empty"));
    }
    if cfg.wordpress.app_password.trim().is_empty() {
        return Err(ConfigError::Invalid("wordpress.app_password must be non-empty"));
    }
    if cfg.wordpress.timeout_secs == 0 {
        return Err(ConfigError::Invalid("wordpress.timeout_secs must be > 0"));
    }
    if cfg.wordpress.max_retries == 0 {
        return Err(ConfigError::Invalid("wordpress.max_retries must be > 0"));
    }
    if cfg.wordpress.backoff_base_secs <= 0.0 {
        return Err(ConfigError::Invalid("wordpress.backoff_base_secs must be > 0"));
    }

    if let Some(path) = &cfg.prompts.template_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Invalid("prompts.template_path must be non-empty when set"));
        }
    }

    Ok(())
}

/// Example YAML config used in docs and tests.
pub fn example() -> &'static str {
    r#"
app:
  poll_interval_ms: 1000
  soft_qc_retries: 2

model:
  api_base_url: "https://api.openai.com/v1"
  api_key: "sk-XXXX"
  name: "gpt-4o-mini"
  max_tokens: null

wordpress:
  base_url: "https://blog.example.com"
  username: "editor"
  app_password: "abcd efgh ijkl mnop"
  timeout_secs: 10
  max_retries: 3
  backoff_base_secs: 0.5
  convert_markdown: true

prompts:
  template_path: null
"#
}
