//! Ad-hoc prompt runner
//!
//! One system + user prompt against any provider, with tunable sampling
//! parameters. Uses the same rotation client as chat, with its own pool.

use crate::client::ResilientClient;
use crate::conversation::ChatMessage;
use crate::credentials::CredentialPool;
use crate::error::ClientError;
use crate::provider::{ChatRequest, ProviderAdapter, ProviderKind, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ready-made system/user prompt pair
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

pub const PRESETS: [Preset; 4] = [
    Preset {
        name: "Code Generation",
        system: "You are an expert programmer.",
        user: "Write a function that finds the longest palindromic substring.",
    },
    Preset {
        name: "Creative Writing",
        system: "You are a creative writer.",
        user: "Write a short story about an AI that develops emotions.",
    },
    Preset {
        name: "Data Analysis",
        system: "You are a data analyst.",
        user: "Compare NoSQL vs SQL for a 10M user chat app.",
    },
    Preset {
        name: "Explain Concept",
        system: "You are an expert teacher.",
        user: "Explain transformer attention mechanisms simply.",
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Catalog model id to the name the provider API expects.
///
/// Unknown ids are passed through unchanged.
pub fn api_model_name(model_id: &str) -> &str {
    match model_id {
        "llama-3-3-70b" => "llama-3.3-70b-versatile",
        "llama-3-1-8b" => "llama-3.1-8b-instant",
        "llama-3-1-405b" => "llama-3.1-70b-versatile",
        "llama-3-2-vision" => "llama-3.2-11b-vision-preview",
        "mixtral-8x7b" => "mixtral-8x7b-32768",
        "gemma2-9b" | "gemma2-27b" => "gemma2-9b-it",
        "phi-3-medium" => "llama-3.3-70b-versatile",
        "gpt-3-5-turbo" => "gpt-3.5-turbo",
        "claude-3-5-sonnet" => "claude-3-5-sonnet-20241022",
        "claude-3-opus" => "claude-3-opus-20240229",
        "claude-3-5-haiku" => "claude-3-5-haiku-20241022",
        "claude-3-sonnet" => "claude-3-sonnet-20240229",
        "claude-3-haiku" => "claude-3-haiku-20240307",
        "gemini-2-0-flash" => "gemini-2.0-flash",
        "gemini-1-5-pro" => "gemini-1.5-pro",
        "gemini-1-5-flash" => "gemini-1.5-flash",
        "mistral-large" => "mistral-large-latest",
        "mistral-small" => "mistral-small-latest",
        "mistral-nemo" => "open-mistral-nemo",
        "codestral" => "codestral-latest",
        "deepseek-r1" => "deepseek-reasoner",
        "deepseek-v3" => "deepseek-chat",
        "deepseek-coder-v2" => "deepseek-coder",
        "qwen-2-5-72b" => "qwen-turbo",
        "qwen-2-5-coder" => "qwen-coder-turbo",
        "qwq-32b" => "qwq-plus",
        other => other,
    }
}

/// Structural state of an entered key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Idle,
    Valid,
    /// The last run with this key failed
    Invalid,
}

impl KeyStatus {
    /// Length-only check; real validation happens on the first call
    pub fn for_key(key: &str) -> Self {
        let len = key.trim().chars().count();
        if len > 10 {
            KeyStatus::Valid
        } else {
            KeyStatus::Idle
        }
    }

    /// Status after a playground run with `key`
    pub fn after_run(key: &str, succeeded: bool) -> Self {
        match Self::for_key(key) {
            KeyStatus::Idle => KeyStatus::Idle,
            _ if succeeded => KeyStatus::Valid,
            _ => KeyStatus::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundSettings {
    pub provider: ProviderKind,
    pub model_id: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    /// Comma-separated
    pub stop_sequences: String,
}

impl Default for PlaygroundSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Groq,
            model_id: "llama-3-3-70b".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            user_prompt: String::new(),
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 1.0,
            stop_sequences: String::new(),
        }
    }
}

impl PlaygroundSettings {
    pub fn apply_preset(&mut self, preset: &Preset) {
        self.system_prompt = preset.system.to_string();
        self.user_prompt = preset.user.to_string();
    }

    pub fn stop_list(&self) -> Vec<String> {
        self.stop_sequences
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Clamp sampling parameters to the ranges providers accept
    pub fn normalized(mut self) -> Self {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.max_tokens = self.max_tokens.clamp(1, 8192);
        self.top_p = self.top_p.clamp(0.0, 1.0);
        self
    }

    pub fn api_model(&self) -> &str {
        api_model_name(&self.model_id)
    }

    pub fn to_request(&self) -> ChatRequest {
        let settings = self.clone().normalized();
        ChatRequest::new(
            settings.api_model(),
            vec![
                ChatMessage::system(settings.system_prompt.clone()),
                ChatMessage::user(settings.user_prompt.clone()),
            ],
        )
        .with_temperature(settings.temperature)
        .with_max_tokens(settings.max_tokens)
        .with_top_p(settings.top_p)
        .with_stop(settings.stop_list())
    }
}

/// Output of a playground run
#[derive(Debug, Clone)]
pub struct PlaygroundResult {
    pub text: String,
    pub model: String,
    pub provider: ProviderKind,
    pub elapsed: Duration,
}

/// Runs playground prompts over a shared transport
#[derive(Clone)]
pub struct Playground {
    transport: Arc<dyn Transport>,
    endpoint_override: Option<String>,
}

impl Playground {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoint_override: None,
        }
    }

    /// Send every run to `endpoint` (custom servers, tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    fn adapter(&self, provider: ProviderKind) -> ProviderAdapter {
        let adapter = ProviderAdapter::new(provider);
        match &self.endpoint_override {
            Some(endpoint) => adapter.with_endpoint(endpoint.clone()),
            None => adapter,
        }
    }

    pub async fn run<F>(
        &self,
        settings: &PlaygroundSettings,
        pool: &CredentialPool,
        on_text: F,
        cancel: &CancellationToken,
    ) -> Result<PlaygroundResult, ClientError>
    where
        F: FnMut(&str) + Send,
    {
        if settings.user_prompt.trim().is_empty() {
            return Err(ClientError::Configuration("prompt is empty".to_string()));
        }
        if pool.is_empty() {
            return Err(ClientError::Configuration(format!(
                "no {} API key set (get one at {})",
                settings.provider.display_name(),
                settings.provider.console_url()
            )));
        }

        let request = settings.to_request();
        let client = ResilientClient::new(self.adapter(settings.provider), self.transport.clone());
        let report = client.send(&request, pool, on_text, cancel).await?;

        Ok(PlaygroundResult {
            text: report.text,
            model: request.model,
            provider: settings.provider,
            elapsed: report.elapsed,
        })
    }
}
