//! ModelScope - chat with and compare LLM providers from the terminal
//!
//! This crate provides:
//! - A streaming chat client that rotates through a pool of API keys
//! - Provider adapters for OpenAI-compatible APIs and Anthropic
//! - Chat sessions and a one-shot prompt playground
//! - Persisted preferences and per-provider keys

pub mod chat;
pub mod client;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod playground;
pub mod provider;
pub mod sse;
pub mod state;
pub mod telemetry;

pub use chat::{ChatSession, ChatSettings, ChatSink, SendOutcome};
pub use client::{AttemptOutcome, RequestAttempt, ResilientClient, SendReport, SendState};
pub use config::Config;
pub use conversation::{ChatMessage, Conversation, ConversationTurn, Role, StreamedAnswer};
pub use credentials::CredentialPool;
pub use error::ClientError;
pub use playground::{Playground, PlaygroundResult, PlaygroundSettings};
pub use provider::{ChatRequest, HttpTransport, ProviderAdapter, ProviderKind, Transport};
pub use state::{AppState, Theme, View};
pub use telemetry::Telemetry;
