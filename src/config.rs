//! Configuration for ModelScope
//!
//! Precedence: CLI flags > environment (`.env` included) > defaults.

use crate::chat::ChatSettings;
use crate::provider::{ProviderAdapter, ProviderKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider configuration for chat
    pub llm: LlmConfig,

    /// Where state, history and logs live
    pub data_dir: PathBuf,

    /// Telemetry settings
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider serving chat requests
    pub provider: ProviderKind,

    /// Base URL for OpenAI-compatible servers (LM Studio, vLLM)
    pub base_url: Option<String>,

    /// Model name/ID
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Temperature for sampling
    pub temperature: f64,

    /// Base environment variable for the key pool (defaults per provider)
    pub key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Directory for log files
    pub log_dir: PathBuf,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Config::default_data_dir();
        Self {
            llm: LlmConfig::default(),
            telemetry: TelemetryConfig {
                log_dir: data_dir.join("logs"),
                verbose: false,
            },
            data_dir,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Groq,
            base_url: None,
            model: ProviderKind::Groq.default_model().to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            key_env: None,
        }
    }
}

impl LlmConfig {
    pub fn adapter(&self) -> ProviderAdapter {
        match &self.base_url {
            Some(base_url) => ProviderAdapter::custom(base_url),
            None => ProviderAdapter::new(self.provider),
        }
    }

    pub fn key_env(&self) -> &str {
        self.key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.key_env())
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..ChatSettings::default()
        }
    }
}

impl Config {
    /// `$XDG_DATA_HOME/modelscope` (or platform equivalent)
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("modelscope"))
            .unwrap_or_else(|| PathBuf::from(".modelscope"))
    }

    /// Defaults overlaid with `MODELSCOPE_*` environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("MODELSCOPE_PROVIDER") {
            config = config.with_provider(provider.parse().map_err(anyhow::Error::msg)?);
        }
        if let Ok(model) = std::env::var("MODELSCOPE_MODEL") {
            config.llm.model = model;
        }
        if let Ok(base_url) = std::env::var("MODELSCOPE_BASE_URL") {
            config.llm.base_url = Some(base_url);
        }
        if let Ok(data_dir) = std::env::var("MODELSCOPE_DATA_DIR") {
            config = config.with_data_dir(PathBuf::from(data_dir));
        }
        Ok(config)
    }

    /// Switch provider; the model follows unless set explicitly afterwards
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.llm.provider = provider;
        self.llm.model = provider.default_model().to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.llm.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.llm.base_url = Some(base_url.into());
        self
    }

    /// Move the data dir (logs follow it)
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.telemetry.log_dir = data_dir.join("logs");
        self.data_dir = data_dir;
        self
    }

    /// Set verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.telemetry.verbose = verbose;
        self
    }

    /// Set log directory
    pub fn with_log_dir(mut self, log_dir: PathBuf) -> Self {
        self.telemetry.log_dir = log_dir;
        self
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.txt")
    }
}
