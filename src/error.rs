//! Error taxonomy for the streaming chat client
//!
//! Recoverable errors (auth/rate-limit/network) are absorbed by the
//! rotation loop in [`crate::client`]. Everything else ends the send and is
//! rendered as a single assistant message.

/// Errors produced while sending a chat request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// No usable credentials; nothing was sent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single credential was rejected (401) or throttled (429)
    #[error("Credential rejected with HTTP {status}")]
    AuthOrRateLimit { status: u16 },

    /// Connection failure or unreadable response before streaming started
    #[error("Network error: {0}")]
    Network(String),

    /// Any other non-success HTTP status
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// Every credential in the pool failed recoverably
    #[error("All credentials exhausted or rate-limited after {attempts} attempts")]
    Exhausted { attempts: usize },

    /// One malformed stream chunk (skipped by the decoder)
    #[error("Malformed stream chunk: {0}")]
    StreamDecode(String),

    /// The body failed mid-stream
    #[error("Stream read error: {0}")]
    Stream(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether the rotation loop should move on to the next credential
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::AuthOrRateLimit { .. } | ClientError::Network(_)
        )
    }

    /// Text shown to the user as an assistant turn
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Configuration(msg) => format!("⚠️ Configuration Error: {}", msg),
            ClientError::Exhausted { .. } => {
                "⚠️ Error: All API keys exhausted or rate limited. Please try again later."
                    .to_string()
            }
            ClientError::Upstream { message, .. } => message.clone(),
            ClientError::Cancelled => "⚠️ Request cancelled.".to_string(),
            other => format!("⚠️ Error: {}", other),
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ClientError::AuthOrRateLimit { status: 401 }.is_recoverable());
        assert!(ClientError::AuthOrRateLimit { status: 429 }.is_recoverable());
        assert!(ClientError::Network("reset".into()).is_recoverable());

        assert!(!ClientError::Upstream { status: 500, message: "boom".into() }.is_recoverable());
        assert!(!ClientError::Exhausted { attempts: 3 }.is_recoverable());
        assert!(!ClientError::Configuration("none".into()).is_recoverable());
    }

    #[test]
    fn test_user_messages() {
        let msg = ClientError::Exhausted { attempts: 2 }.user_message();
        assert!(msg.contains("try again later"));

        let msg = ClientError::Upstream {
            status: 400,
            message: "model not found".into(),
        }
        .user_message();
        assert_eq!(msg, "model not found");

        let msg = ClientError::Configuration("no credentials available".into()).user_message();
        assert!(msg.starts_with("⚠️ Configuration Error"));
    }
}
