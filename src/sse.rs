//! Server-sent event decoding for chat completion streams
//!
//! Network chunks do not line up with SSE lines: one chunk may carry several
//! events, and one JSON payload may be split across two chunks. The line
//! buffer holds the unterminated tail until the rest arrives.

use crate::error::ClientError;
use serde::Deserialize;
use std::mem;

/// A decoded SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data: ` payload with the prefix stripped
    Data(String),
    /// The `data: [DONE]` sentinel
    Done,
}

/// Line-buffering SSE parser
///
/// Buffers raw bytes, so a multibyte character split across chunks is only
/// decoded once its line is complete.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning the events from every completed line
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode a trailing line that was never newline-terminated
    pub fn flush(&mut self) -> Option<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&remaining))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\n', '\r']);

    // event:, id:, retry: and `:` comments carry nothing we use
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    if data.trim().is_empty() {
        return None;
    }
    Some(SseEvent::Data(data.to_string()))
}

// Streaming chunk shape: {"choices":[{"delta":{"content":"..."}}]}
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamChunkDelta {
    content: Option<String>,
}

/// Extract the text delta from one `data:` payload.
///
/// Chunks without content (role headers, usage frames) yield `Ok(None)`.
pub fn parse_delta(data: &str) -> Result<Option<String>, ClientError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| ClientError::StreamDecode(e.to_string()))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|s| !s.is_empty()))
}

/// Text of a non-streaming completion body.
///
/// OpenAI-style `choices[0].message.content`, then Anthropic-style
/// `content[0].text`, then the raw JSON.
pub fn extract_complete_text(body: &serde_json::Value) -> String {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .or_else(|| {
            body.get("content")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("text"))
                .and_then(|t| t.as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}
