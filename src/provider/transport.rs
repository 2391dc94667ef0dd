//! HTTP transport for chat completion requests
//!
//! The rotation client only needs "POST this JSON, give me a status and a
//! byte stream". `HttpTransport` does that with reqwest; tests plug in
//! scripted transports.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use std::pin::Pin;
use std::time::Duration;

/// Response body as a stream of network chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Transport-level failures (no HTTP status available)
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Body read failed: {0}")]
    Body(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Status line, content type and body of an HTTP response
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("text/event-stream"))
    }

    /// Read the whole body as (lossy) UTF-8
    pub async fn text(self) -> Result<String, TransportError> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        let bytes: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Sends one JSON POST
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        endpoint: &str,
        headers: &[(String, String)],
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        headers: &[(String, String)],
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.post(endpoint);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())));

        Ok(TransportResponse {
            status,
            content_type,
            body: Box::pin(body),
        })
    }
}

/// Message for a failed (non-auth) HTTP response.
///
/// Uses `error.message`, then `message`, from a JSON error body.
pub fn upstream_message(provider: &str, status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("API Error {}: Check your {} API key", status, provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn response(status: u16, content_type: Option<&str>, chunks: Vec<&'static str>) -> TransportResponse {
        let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))));
        TransportResponse {
            status,
            content_type: content_type.map(str::to_string),
            body: Box::pin(body),
        }
    }

    #[test]
    fn test_upstream_message_sources() {
        let nested = r#"{"error":{"message":"model not found","type":"invalid_request_error"}}"#;
        assert_eq!(upstream_message("Groq", 404, nested), "model not found");

        let flat = r#"{"message":"bad request"}"#;
        assert_eq!(upstream_message("Groq", 400, flat), "bad request");

        assert_eq!(
            upstream_message("Mistral", 500, "<html>oops</html>"),
            "API Error 500: Check your Mistral API key"
        );
    }

    #[test]
    fn test_event_stream_detection() {
        assert!(response(200, Some("text/event-stream; charset=utf-8"), vec![]).is_event_stream());
        assert!(!response(200, Some("application/json"), vec![]).is_event_stream());
        assert!(!response(200, None, vec![]).is_event_stream());
        assert!(!response(429, None, vec![]).is_success());
    }

    #[tokio::test]
    async fn test_text_joins_chunks() {
        let text = response(200, None, vec!["{\"a\":", "1}"]).text().await.unwrap();
        assert_eq!(text, "{\"a\":1}");
    }
}
