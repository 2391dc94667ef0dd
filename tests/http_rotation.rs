//! End-to-end rotation over real HTTP against a mock provider

use anyhow::Result;
use modelscope::chat::SYSTEM_PROMPT;
use modelscope::conversation::ChatMessage;
use modelscope::{
    ChatRequest, ChatSession, ChatSettings, ChatSink, ClientError, ConversationTurn,
    CredentialPool, HttpTransport, ProviderAdapter, ProviderKind, ResilientClient, Role,
    SendOutcome,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_A: &str = "gsk_first_key_0001";
const KEY_B: &str = "gsk_second_key_0002";
const KEY_C: &str = "gsk_third_key_0003";

const HELLO_SSE: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
data: [DONE]\n\n";

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

fn client_for(server: &MockServer, kind: ProviderKind) -> Result<ResilientClient> {
    let adapter = ProviderAdapter::new(kind)
        .with_endpoint(format!("{}/v1/chat/completions", server.uri()));
    Ok(ResilientClient::new(adapter, Arc::new(HttpTransport::new()?)))
}

fn hello_request() -> ChatRequest {
    ChatRequest::new(
        "llama-3.3-70b-versatile",
        vec![ChatMessage::system("Be brief."), ChatMessage::user("hi")],
    )
}

#[tokio::test]
async fn test_rate_limited_key_rotates_to_next() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {}", KEY_A).as_str()))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {}", KEY_B).as_str()))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(sse_response(HELLO_SSE))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, ProviderKind::Groq)?;
    let pool = CredentialPool::new([KEY_A, KEY_B, KEY_C]);

    let mut seen = Vec::new();
    let report = client
        .send(
            &hello_request(),
            &pool,
            |text| seen.push(text.to_string()),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(report.text, "Hello");
    assert_eq!(report.credential_index, 1);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(seen, vec!["Hel", "Hello"]);
    assert_eq!(pool.cursor(), 2);
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_not_rotated() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("authorization", format!("Bearer {}", KEY_A).as_str()))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": { "message": "model overloaded" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(header("authorization", format!("Bearer {}", KEY_B).as_str()))
        .respond_with(sse_response(HELLO_SSE))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, ProviderKind::Groq)?;
    let pool = CredentialPool::new([KEY_A, KEY_B]);

    let err = client
        .send(&hello_request(), &pool, |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ClientError::Upstream {
            status: 500,
            message: "model overloaded".to_string(),
        }
    );
    assert_eq!(pool.cursor(), 0);
    Ok(())
}

#[tokio::test]
async fn test_all_keys_rejected_exhausts_pool() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, ProviderKind::OpenAi)?;
    let pool = CredentialPool::new([KEY_A, KEY_B]);
    pool.set_cursor(1);

    let err = client
        .send(&hello_request(), &pool, |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::Exhausted { attempts: 2 });
    assert_eq!(pool.cursor(), 1);
    Ok(())
}

#[tokio::test]
async fn test_anthropic_request_shape_and_json_answer() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("x-api-key", KEY_A))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "system": "Be brief.",
            "stream": false,
            "messages": [{ "role": "user", "content": "hi" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Hi there" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, ProviderKind::Anthropic)?;
    let pool = CredentialPool::new([KEY_A]);

    let mut seen = Vec::new();
    let report = client
        .send(
            &hello_request(),
            &pool,
            |text| seen.push(text.to_string()),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(report.text, "Hi there");
    assert_eq!(seen, vec!["Hi there"]);
    Ok(())
}

#[derive(Default)]
struct Collected {
    turns: Vec<ConversationTurn>,
    errors: Vec<String>,
}

impl ChatSink for Collected {
    fn append_turn(&mut self, turn: &ConversationTurn) {
        self.turns.push(turn.clone());
    }

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn report_text(&mut self, _text: &str) {}
}

#[tokio::test]
async fn test_chat_session_sends_system_prompt_and_history() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": "hello" }
            ]
        })))
        .respond_with(sse_response(HELLO_SSE))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, ProviderKind::Groq)?;
    let pool = Arc::new(CredentialPool::new([KEY_A]));
    let session = ChatSession::new(client, pool, ChatSettings::default());

    let mut sink = Collected::default();
    let outcome = session.send("hello", &mut sink).await;

    assert!(matches!(outcome, SendOutcome::Completed(_)));
    assert!(sink.errors.is_empty());
    assert_eq!(sink.turns.len(), 2);
    assert_eq!(sink.turns[0].role, Role::User);
    assert_eq!(sink.turns[1].role, Role::Assistant);
    assert_eq!(sink.turns[1].content, "Hello");
    assert_eq!(session.conversation().len(), 2);
    Ok(())
}
