//! Chat session: one conversation driven through the resilient client.
//!
//! A session allows a single in-flight send. `clear()` starts a new
//! conversation generation; anything still arriving for an older generation
//! is dropped instead of being applied to the new conversation.

use crate::client::{ResilientClient, SendReport};
use crate::conversation::{Conversation, ConversationTurn};
use crate::credentials::CredentialPool;
use crate::error::ClientError;
use crate::provider::{ChatRequest, ProviderKind};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const SYSTEM_PROMPT: &str = "You are ModelScope AI — a Senior AI Research Engineer and Intelligence System.

Your goal is to provide comprehensive, deep, and structured analysis of AI models for the user's specific use case.

Guidelines:
1. **Deep Analysis**: Go beyond surface-level stats. Explain *why* a model is good for the task (architecture, training data focus, etc.).
2. **Structured Comparison**: Use **Markdown Tables** to compare models on key metrics:
   - Reasoning Capability
   - Coding Proficiency
   - Context Window
   - Pricing / Cost Efficiency
   - Licensing (Open Weights vs Proprietary)
3. **Actionable Recommendation**: Conclude with a clear recommendation: \"Use [Model X] for [Task A], usage [Model Y] for [Task B]\".
4. **Formatting**: Use explicit headings, bullet points, and bold text for readability.
5. **Tone**: Authoritative, technical yet accessible, and helpful.";

/// Suggestions offered on an empty conversation
pub const STARTER_PROMPTS: [&str; 4] = [
    "Best model for coding python?",
    "Compare GPT-4o vs Claude 3.5",
    "Cheapest vision model?",
    "High performance reasoning?",
];

/// Receives conversation updates (the UI side)
pub trait ChatSink: Send {
    /// A turn was added to the conversation
    fn append_turn(&mut self, turn: &ConversationTurn);

    /// A send failed; `message` is also appended as an assistant turn
    fn report_error(&mut self, message: &str);

    /// Accumulated answer text so far
    fn report_text(&mut self, text: &str);
}

/// Model parameters for chat requests
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: ProviderKind::Groq.default_model().to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

/// What happened to a `send` call
#[derive(Debug)]
pub enum SendOutcome {
    /// Blank input, or another send was already in flight
    Ignored,
    Completed(SendReport),
    /// Error already rendered into the conversation
    Failed(ClientError),
    /// Stopped by `cancel()`; any partial answer was kept
    Cancelled,
    /// The conversation was cleared while this send was running
    Abandoned,
}

#[derive(Debug, Default)]
struct SessionState {
    conversation: Conversation,
    generation: u64,
    in_flight: Option<u64>,
    cancel: Option<CancellationToken>,
}

/// Handle to a chat session; clones share the same conversation
#[derive(Clone)]
pub struct ChatSession {
    client: ResilientClient,
    pool: Arc<CredentialPool>,
    settings: ChatSettings,
    state: Arc<Mutex<SessionState>>,
}

impl ChatSession {
    pub fn new(client: ResilientClient, pool: Arc<CredentialPool>, settings: ChatSettings) -> Self {
        Self {
            client,
            pool,
            settings,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Snapshot of the current conversation
    pub fn conversation(&self) -> Conversation {
        self.state.lock().conversation.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Start a new conversation, abandoning any in-flight send
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.conversation.reset();
        state.generation += 1;
        state.in_flight = None;
        tracing::debug!(generation = state.generation, "Chat session cleared");
    }

    /// Stop the in-flight send, keeping whatever text already arrived
    pub fn cancel(&self) {
        if let Some(token) = self.state.lock().cancel.as_ref() {
            token.cancel();
        }
    }

    /// Send one user message and record the answer (or error) as a turn
    pub async fn send<S: ChatSink>(&self, text: &str, sink: &mut S) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        let (generation, request, cancel) = {
            let mut state = self.state.lock();
            if state.in_flight.is_some() {
                tracing::debug!("Send ignored, another request is in flight");
                return SendOutcome::Ignored;
            }

            if self.pool.is_empty() {
                let err = ClientError::Configuration(
                    "No API Keys found. Please set GROQ_API_KEY in your .env file.".to_string(),
                );
                let turn = ConversationTurn::assistant(err.user_message());
                sink.report_error(&turn.content);
                sink.append_turn(&turn);
                state.conversation.push(turn);
                return SendOutcome::Failed(err);
            }

            let turn = ConversationTurn::user(text);
            sink.append_turn(&turn);
            state.conversation.push(turn);

            let messages = state
                .conversation
                .to_request_messages(&self.settings.system_prompt);
            let request = ChatRequest::new(self.settings.model.clone(), messages)
                .with_temperature(self.settings.temperature)
                .with_max_tokens(self.settings.max_tokens);

            let cancel = CancellationToken::new();
            state.in_flight = Some(state.generation);
            state.cancel = Some(cancel.clone());
            (state.generation, request, cancel)
        };

        let mut partial = String::new();
        let result = {
            let state = &self.state;
            let partial = &mut partial;
            let sink = &mut *sink;
            self.client
                .send(
                    &request,
                    &self.pool,
                    |accumulated| {
                        if state.lock().generation != generation {
                            return;
                        }
                        partial.clear();
                        partial.push_str(accumulated);
                        sink.report_text(accumulated);
                    },
                    &cancel,
                )
                .await
        };

        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(generation, "Dropping result for cleared conversation");
            return SendOutcome::Abandoned;
        }
        state.in_flight = None;
        state.cancel = None;

        match result {
            Ok(report) => {
                let turn = ConversationTurn::assistant(report.text.clone());
                sink.append_turn(&turn);
                state.conversation.push(turn);
                SendOutcome::Completed(report)
            }
            Err(ClientError::Cancelled) => {
                if !partial.is_empty() {
                    let turn = ConversationTurn::assistant(partial);
                    sink.append_turn(&turn);
                    state.conversation.push(turn);
                }
                SendOutcome::Cancelled
            }
            Err(err) => {
                let turn = ConversationTurn::assistant(err.user_message());
                sink.report_error(&turn.content);
                sink.append_turn(&turn);
                state.conversation.push(turn);
                SendOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{keys, Scripted, ScriptedTransport, HELLO};
    use crate::conversation::Role;
    use crate::provider::ProviderAdapter;

    #[derive(Default)]
    struct RecordingSink {
        turns: Vec<ConversationTurn>,
        errors: Vec<String>,
        texts: Vec<String>,
    }

    impl ChatSink for RecordingSink {
        fn append_turn(&mut self, turn: &ConversationTurn) {
            self.turns.push(turn.clone());
        }

        fn report_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }

        fn report_text(&mut self, text: &str) {
            self.texts.push(text.to_string());
        }
    }

    fn session(script: Vec<Scripted>, pool: CredentialPool) -> (ChatSession, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new(script);
        let client = ResilientClient::new(ProviderAdapter::new(ProviderKind::Groq), transport.clone());
        (
            ChatSession::new(client, Arc::new(pool), ChatSettings::default()),
            transport,
        )
    }

    #[tokio::test]
    async fn test_send_records_both_turns() {
        let (session, _) = session(vec![Scripted::Sse(HELLO.to_vec())], keys(2));
        let mut sink = RecordingSink::default();

        let outcome = session.send("Which model?", &mut sink).await;
        assert!(matches!(outcome, SendOutcome::Completed(_)));

        let conversation = session.conversation();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns[0].role, Role::User);
        assert_eq!(conversation.turns[1].content, "Hello");
        assert_eq!(sink.texts, vec!["Hel", "Hello"]);
        assert_eq!(sink.turns.len(), 2);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_blank_input_ignored() {
        let (session, transport) = session(vec![], keys(1));
        let mut sink = RecordingSink::default();

        assert!(matches!(session.send("   ", &mut sink).await, SendOutcome::Ignored));
        assert!(transport.credentials().is_empty());
        assert!(session.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pool_renders_configuration_error() {
        let (session, transport) = session(vec![], CredentialPool::empty());
        let mut sink = RecordingSink::default();

        let outcome = session.send("hello", &mut sink).await;
        assert!(matches!(outcome, SendOutcome::Failed(ClientError::Configuration(_))));
        assert!(transport.credentials().is_empty());

        let conversation = session.conversation();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns[0].role, Role::Assistant);
        assert!(conversation.turns[0].content.contains("Configuration Error"));
        assert_eq!(sink.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_rendered_as_assistant_turn() {
        let (session, _) = session(
            vec![Scripted::Status(429, "{}"), Scripted::Status(401, "{}")],
            keys(2),
        );
        let mut sink = RecordingSink::default();

        let outcome = session.send("hello", &mut sink).await;
        assert!(matches!(outcome, SendOutcome::Failed(ClientError::Exhausted { attempts: 2 })));

        let last = session.conversation().last().cloned().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.contains("try again later"));
    }

    #[tokio::test]
    async fn test_history_sent_with_follow_up() {
        let (session, _) = session(
            vec![Scripted::Sse(HELLO.to_vec()), Scripted::Sse(HELLO.to_vec())],
            keys(1),
        );
        let mut sink = RecordingSink::default();

        session.send("first", &mut sink).await;
        session.send("second", &mut sink).await;

        let conversation = session.conversation();
        let messages = conversation.to_request_messages(SYSTEM_PROMPT);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[3].content, "second");
    }

    #[tokio::test]
    async fn test_concurrent_send_is_ignored() {
        let (session, transport) = session(vec![Scripted::Sse(HELLO.to_vec())], keys(1));
        session.state.lock().in_flight = Some(0);
        let mut sink = RecordingSink::default();

        assert!(matches!(session.send("hello", &mut sink).await, SendOutcome::Ignored));
        assert!(transport.credentials().is_empty());
    }

    /// Clears the session from inside the stream callback, as a user
    /// navigating away mid-answer would.
    struct ClearingSink {
        session: ChatSession,
        texts: Vec<String>,
        turns: usize,
    }

    impl ChatSink for ClearingSink {
        fn append_turn(&mut self, _turn: &ConversationTurn) {
            self.turns += 1;
        }

        fn report_error(&mut self, _message: &str) {}

        fn report_text(&mut self, text: &str) {
            self.texts.push(text.to_string());
            self.session.clear();
        }
    }

    #[tokio::test]
    async fn test_clear_mid_stream_abandons_send() {
        let (session, _) = session(vec![Scripted::Sse(HELLO.to_vec())], keys(1));
        let mut sink = ClearingSink {
            session: session.clone(),
            texts: Vec::new(),
            turns: 0,
        };

        let outcome = session.send("hello", &mut sink).await;
        assert!(matches!(outcome, SendOutcome::Abandoned));

        // Only the first delta got through before the clear
        assert_eq!(sink.texts, vec!["Hel"]);
        assert!(session.conversation().is_empty());
        assert!(!session.is_busy());
    }
    /// Stops the answer after the first delta, like Ctrl+C in the REPL
    struct CancellingSink {
        session: ChatSession,
        inner: RecordingSink,
    }

    impl ChatSink for CancellingSink {
        fn append_turn(&mut self, turn: &ConversationTurn) {
            self.inner.append_turn(turn);
        }

        fn report_error(&mut self, message: &str) {
            self.inner.report_error(message);
        }

        fn report_text(&mut self, text: &str) {
            self.inner.report_text(text);
            self.session.cancel();
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_partial_answer() {
        let (session, _) = session(vec![Scripted::Sse(HELLO.to_vec())], keys(1));
        let mut sink = CancellingSink {
            session: session.clone(),
            inner: RecordingSink::default(),
        };

        let outcome = session.send("hello", &mut sink).await;
        assert!(matches!(outcome, SendOutcome::Cancelled));

        assert_eq!(sink.inner.texts, vec!["Hel"]);
        assert!(sink.inner.errors.is_empty());

        let conversation = session.conversation();
        assert_eq!(conversation.len(), 2);
        let last = conversation.last().cloned().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Hel");
        assert!(!session.is_busy());
    }
}
