//! Provider adapters
//!
//! Each provider differs only in endpoint, auth headers and body shape; the
//! rotation client never branches on the provider itself.

use super::ChatRequest;
use crate::conversation::Role;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Known chat completion providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Groq,
    Mistral,
    DeepSeek,
    DashScope,
    Xai,
    Cohere,
    Yi,
    /// Any OpenAI-compatible endpoint (LM Studio, vLLM, ...)
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 10] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Groq,
        ProviderKind::Mistral,
        ProviderKind::DeepSeek,
        ProviderKind::DashScope,
        ProviderKind::Xai,
        ProviderKind::Cohere,
        ProviderKind::Yi,
        ProviderKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Groq => "groq",
            ProviderKind::Mistral => "mistral",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::DashScope => "dashscope",
            ProviderKind::Xai => "xai",
            ProviderKind::Cohere => "cohere",
            ProviderKind::Yi => "yi",
            ProviderKind::Custom => "custom",
        }
    }

    /// Human-readable name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Groq => "Groq",
            ProviderKind::Mistral => "Mistral",
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::DashScope => "Alibaba DashScope",
            ProviderKind::Xai => "xAI",
            ProviderKind::Cohere => "Cohere",
            ProviderKind::Yi => "01.AI",
            ProviderKind::Custom => "Custom",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1/chat/completions",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1/messages",
            ProviderKind::Groq => "https://api.groq.com/openai/v1/chat/completions",
            ProviderKind::Mistral => "https://api.mistral.ai/v1/chat/completions",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            ProviderKind::DashScope => {
                "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
            }
            ProviderKind::Xai => "https://api.x.ai/v1/chat/completions",
            ProviderKind::Cohere => "https://api.cohere.ai/compatibility/v1/chat/completions",
            ProviderKind::Yi => "https://api.01.ai/v1/chat/completions",
            ProviderKind::Custom => "http://localhost:1234/v1/chat/completions",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::Mistral => "mistral-large-latest",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::DashScope => "qwen-turbo",
            ProviderKind::Xai => "grok-2",
            ProviderKind::Cohere => "command-r-plus",
            ProviderKind::Yi => "yi-lightning",
            ProviderKind::Custom => "local-model",
        }
    }

    /// Base environment variable for this provider's key pool
    pub fn key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Mistral => "MISTRAL_API_KEY",
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderKind::DashScope => "DASHSCOPE_API_KEY",
            ProviderKind::Xai => "XAI_API_KEY",
            ProviderKind::Cohere => "COHERE_API_KEY",
            ProviderKind::Yi => "YI_API_KEY",
            ProviderKind::Custom => "CUSTOM_API_KEY",
        }
    }

    /// Placeholder hint for key entry
    pub fn key_placeholder(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::DashScope => "sk-...",
            ProviderKind::Anthropic => "sk-ant-...",
            ProviderKind::Groq => "gsk_...",
            ProviderKind::Xai => "xai-...",
            ProviderKind::Mistral => "Mistral API key",
            ProviderKind::Cohere => "Cohere API key",
            ProviderKind::Yi => "Yi API key",
            ProviderKind::Custom => "any value",
        }
    }

    /// Where to get a key
    pub fn console_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "platform.openai.com/api-keys",
            ProviderKind::Anthropic => "console.anthropic.com",
            ProviderKind::Groq => "console.groq.com/keys",
            ProviderKind::Mistral => "console.mistral.ai",
            ProviderKind::DeepSeek => "platform.deepseek.com",
            ProviderKind::DashScope => "dashscope.console.aliyun.com",
            ProviderKind::Xai => "console.x.ai",
            ProviderKind::Cohere => "dashboard.cohere.com",
            ProviderKind::Yi => "platform.01.ai",
            ProviderKind::Custom => "localhost",
        }
    }

    /// Map a model catalog vendor name to the provider serving it.
    ///
    /// Meta and Microsoft open-weight models are served through Groq.
    pub fn from_vendor(vendor: &str) -> Option<Self> {
        match vendor.to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" => Some(ProviderKind::Anthropic),
            "meta" | "microsoft" | "groq" => Some(ProviderKind::Groq),
            "mistral" => Some(ProviderKind::Mistral),
            "deepseek" => Some(ProviderKind::DeepSeek),
            "alibaba" | "dashscope" => Some(ProviderKind::DashScope),
            "xai" => Some(ProviderKind::Xai),
            "cohere" => Some(ProviderKind::Cohere),
            "01.ai" | "yi" => Some(ProviderKind::Yi),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowercase = s.to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str() == lowercase)
            .or_else(|| ProviderKind::from_vendor(&lowercase))
            .ok_or_else(|| {
                let known: Vec<&str> = ProviderKind::ALL.iter().map(|p| p.as_str()).collect();
                format!("Unknown provider '{}'. Known providers: {}", s, known.join(", "))
            })
    }
}

/// A provider plus the endpoint requests go to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAdapter {
    pub kind: ProviderKind,
    pub endpoint: String,
}

impl ProviderAdapter {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            endpoint: kind.default_endpoint().to_string(),
        }
    }

    /// OpenAI-compatible server at `base_url` (e.g. "http://localhost:1234/v1")
    pub fn custom(base_url: &str) -> Self {
        Self {
            kind: ProviderKind::Custom,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.display_name()
    }

    /// Whether this provider is asked for an SSE stream
    pub fn streams(&self) -> bool {
        !matches!(self.kind, ProviderKind::Anthropic)
    }

    /// Headers carrying the credential (plus content type)
    pub fn headers(&self, credential: &str) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        match self.kind {
            ProviderKind::Anthropic => {
                headers.push(("x-api-key".to_string(), credential.to_string()));
                headers.push(("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()));
            }
            _ => {
                headers.push(("Authorization".to_string(), format!("Bearer {}", credential)));
            }
        }
        headers
    }

    /// Provider-specific JSON body for a request
    pub fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        match self.kind {
            ProviderKind::Anthropic => {
                let system: Vec<&str> = request
                    .messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str())
                    .collect();
                let messages: Vec<_> = request
                    .messages
                    .iter()
                    .filter(|m| m.role != Role::System)
                    .collect();

                let mut body = json!({
                    "model": request.model,
                    "max_tokens": request.max_tokens,
                    "system": system.join("\n\n"),
                    "messages": messages,
                    "temperature": request.temperature,
                    "stream": false,
                });
                if let Some(top_p) = request.top_p {
                    body["top_p"] = json!(top_p);
                }
                if !request.stop.is_empty() {
                    body["stop_sequences"] = json!(request.stop);
                }
                body
            }
            _ => {
                let mut body = json!(request);
                body["stream"] = json!(request.stream && self.streams());
                body
            }
        }
    }
}
