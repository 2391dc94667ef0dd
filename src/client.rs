//! Resilient streaming chat client
//!
//! Sends one chat request, rotating through a credential pool on
//! authentication, rate-limit and network failures, then decodes the SSE
//! response into a growing text value.
//!
//! State machine per send:
//! `Idle -> Attempting(i) -> {Attempting(i+1) | Streaming | Failed}`,
//! `Streaming -> {Done | Failed}`.

use crate::conversation::StreamedAnswer;
use crate::credentials::CredentialPool;
use crate::error::ClientError;
use crate::provider::{
    upstream_message, ChatRequest, ProviderAdapter, Transport, TransportResponse,
};
use crate::sse::{extract_complete_text, parse_delta, SseEvent, SseLineBuffer};
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a single send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Attempting(usize),
    Streaming,
    Done,
    Failed,
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendState::Idle => write!(f, "idle"),
            SendState::Attempting(i) => write!(f, "attempting({})", i),
            SendState::Streaming => write!(f, "streaming"),
            SendState::Done => write!(f, "done"),
            SendState::Failed => write!(f, "failed"),
        }
    }
}

/// How one credential fared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    AuthRejected,
    RateLimited,
    NetworkError,
}

/// One credential tried during a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestAttempt {
    pub credential_index: usize,
    pub outcome: AttemptOutcome,
}

/// Result of a completed send
#[derive(Debug, Clone)]
pub struct SendReport {
    /// Full answer text
    pub text: String,
    /// Index of the credential that succeeded
    pub credential_index: usize,
    /// Every attempt in order, the last one successful
    pub attempts: Vec<RequestAttempt>,
    pub elapsed: Duration,
}

/// Chat client bound to one provider adapter
#[derive(Clone)]
pub struct ResilientClient {
    adapter: ProviderAdapter,
    transport: Arc<dyn Transport>,
}

impl ResilientClient {
    pub fn new(adapter: ProviderAdapter, transport: Arc<dyn Transport>) -> Self {
        Self { adapter, transport }
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    /// Send `request`, rotating through `pool` until one credential works.
    ///
    /// `on_text` receives the accumulated answer after every decoded delta.
    /// On success the pool cursor moves past the credential that worked.
    pub async fn send<F>(
        &self,
        request: &ChatRequest,
        pool: &CredentialPool,
        mut on_text: F,
        cancel: &CancellationToken,
    ) -> Result<SendReport, ClientError>
    where
        F: FnMut(&str) + Send,
    {
        if pool.is_empty() {
            tracing::warn!(provider = self.adapter.name(), "No credentials configured");
            return Err(ClientError::Configuration(
                "no credentials available".to_string(),
            ));
        }

        let started = Instant::now();
        let body = self.adapter.build_body(request);
        let start = pool.cursor();
        let mut attempts = Vec::with_capacity(pool.len());

        tracing::info!(
            target: "llm",
            provider = self.adapter.name(),
            model = %request.model,
            message_count = request.messages.len(),
            pool_size = pool.len(),
            cursor = start,
            state = %SendState::Idle,
            "Starting chat request"
        );

        for attempt in 0..pool.len() {
            let index = pool.index_for(start, attempt);
            let Some(credential) = pool.get(index) else {
                break;
            };

            tracing::debug!(
                target: "llm",
                state = %SendState::Attempting(attempt),
                credential_index = index,
                "Trying credential"
            );

            let headers = self.adapter.headers(credential);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = self.transport.post(&self.adapter.endpoint, &headers, &body) => result,
            };

            let response = match self.check_response(result).await {
                Ok(response) => response,
                Err(err) if err.is_recoverable() => {
                    let outcome = match &err {
                        ClientError::AuthOrRateLimit { status: 429 } => AttemptOutcome::RateLimited,
                        ClientError::AuthOrRateLimit { .. } => AttemptOutcome::AuthRejected,
                        _ => AttemptOutcome::NetworkError,
                    };
                    tracing::warn!(
                        target: "llm",
                        credential_index = index,
                        error = %err,
                        "Credential failed, trying next"
                    );
                    attempts.push(RequestAttempt {
                        credential_index: index,
                        outcome,
                    });
                    continue;
                }
                Err(err) => {
                    tracing::error!(
                        target: "llm",
                        state = %SendState::Failed,
                        credential_index = index,
                        error = %err,
                        "Chat request failed"
                    );
                    return Err(err);
                }
            };

            attempts.push(RequestAttempt {
                credential_index: index,
                outcome: AttemptOutcome::Success,
            });
            pool.advance_past(index);

            tracing::debug!(
                target: "llm",
                state = %SendState::Streaming,
                credential_index = index,
                "Receiving response"
            );

            let text = match self.read_answer(response, &mut on_text, cancel).await {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(
                        target: "llm",
                        state = %SendState::Failed,
                        error = %err,
                        "Response stream failed"
                    );
                    return Err(err);
                }
            };

            let elapsed = started.elapsed();
            tracing::info!(
                target: "llm",
                state = %SendState::Done,
                credential_index = index,
                attempts = attempts.len(),
                answer_len = text.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Chat request completed"
            );

            return Ok(SendReport {
                text,
                credential_index: index,
                attempts,
                elapsed,
            });
        }

        tracing::error!(
            target: "llm",
            state = %SendState::Failed,
            attempts = attempts.len(),
            "All credentials exhausted"
        );
        Err(ClientError::Exhausted {
            attempts: attempts.len(),
        })
    }

    /// Classify a transport result into success, recoverable or fatal
    async fn check_response(
        &self,
        result: Result<TransportResponse, crate::provider::TransportError>,
    ) -> Result<TransportResponse, ClientError> {
        let response = result.map_err(|e| ClientError::Network(e.to_string()))?;

        match response.status {
            401 | 429 => Err(ClientError::AuthOrRateLimit {
                status: response.status,
            }),
            _ if response.is_success() => Ok(response),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::Upstream {
                    status,
                    message: upstream_message(self.adapter.name(), status, &text),
                })
            }
        }
    }

    async fn read_answer<F>(
        &self,
        response: TransportResponse,
        on_text: &mut F,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str) + Send,
    {
        if !response.is_event_stream() {
            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                raw = response.text() => raw.map_err(|e| ClientError::Stream(e.to_string()))?,
            };
            let body: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| ClientError::Stream(format!("malformed response body: {}", e)))?;
            let text = extract_complete_text(&body);
            on_text(&text);
            return Ok(text);
        }

        let mut body = response.body;
        let mut parser = SseLineBuffer::new();
        let mut answer = StreamedAnswer::new();

        'stream: loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                chunk = body.next() => chunk,
            };

            let (events, ended) = match chunk {
                Some(Ok(bytes)) => (parser.feed(&bytes), false),
                Some(Err(e)) => return Err(ClientError::Stream(e.to_string())),
                None => (parser.flush().into_iter().collect(), true),
            };

            for event in events {
                if cancel.is_cancelled() {
                    return Err(ClientError::Cancelled);
                }
                let data = match event {
                    SseEvent::Done => break 'stream,
                    SseEvent::Data(data) => data,
                };
                match parse_delta(&data) {
                    Ok(Some(delta)) => {
                        answer.push(&delta);
                        on_text(answer.as_str());
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!(target: "llm", error = %err, "Skipping stream chunk");
                    }
                }
            }

            if ended {
                break;
            }
        }

        Ok(answer.into_text())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for exercising the rotation loop without a network

    use super::*;
    use crate::provider::{TransportError, TransportResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// What the scripted transport returns for one call
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Status(u16, &'static str),
        Sse(Vec<&'static str>),
        Json(&'static str),
        NetworkError,
        /// SSE chunks followed by a body read error
        BrokenSse(Vec<&'static str>),
    }

    #[derive(Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        /// Credentials used, in call order
        pub fn credentials(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    fn chunks(lines: Vec<&'static str>) -> Vec<Result<Bytes, TransportError>> {
        lines
            .into_iter()
            .map(|l| Ok(Bytes::from_static(l.as_bytes())))
            .collect()
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(
            &self,
            _endpoint: &str,
            headers: &[(String, String)],
            _body: &serde_json::Value,
        ) -> Result<TransportResponse, TransportError> {
            let credential = headers
                .iter()
                .find(|(name, _)| name == "Authorization" || name == "x-api-key")
                .map(|(_, value)| value.trim_start_matches("Bearer ").to_string())
                .unwrap_or_default();
            self.calls.lock().push(credential);

            let next = self
                .script
                .lock()
                .pop_front()
                .unwrap_or(Scripted::Status(500, "script exhausted"));

            let (status, content_type, body): (u16, &str, Vec<Result<Bytes, TransportError>>) =
                match next {
                    Scripted::NetworkError => {
                        return Err(TransportError::Request("connection refused".into()))
                    }
                    Scripted::Status(status, body) => (status, "application/json", chunks(vec![body])),
                    Scripted::Sse(lines) => (200, "text/event-stream", chunks(lines)),
                    Scripted::Json(body) => (200, "application/json", chunks(vec![body])),
                    Scripted::BrokenSse(lines) => {
                        let mut body = chunks(lines);
                        body.push(Err(TransportError::Body("connection reset".into())));
                        (200, "text/event-stream", body)
                    }
                };

            Ok(TransportResponse {
                status,
                content_type: Some(content_type.to_string()),
                body: Box::pin(stream::iter(body)),
            })
        }
    }

    pub fn keys(n: usize) -> CredentialPool {
        CredentialPool::new((0..n).map(|i| format!("gsk_test_key_{}", i)))
    }

    pub const HELLO: [&str; 3] = [
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    ];
}
