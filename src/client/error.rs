//! Client-side error taxonomy.

use crate::errors::codes;

pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";

/// Error surfaced by the feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Malformed input, rejected locally or by the server
    Validation(String),
    /// Referenced entity absent
    NotFound(String),
    /// Network or server failure
    Transport(String),
}

impl ClientError {
    /// Map a server error code from the response envelope.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            codes::VALIDATION_ERROR | codes::BAD_REQUEST => ClientError::Validation(message),
            codes::NOT_FOUND => ClientError::NotFound(message),
            _ => ClientError::Transport(message),
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::Validation(_) => codes::VALIDATION_ERROR,
            ClientError::NotFound(_) => codes::NOT_FOUND,
            ClientError::Transport(_) => TRANSPORT_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::Validation(msg) | ClientError::NotFound(msg) | ClientError::Transport(msg) => {
                msg
            }
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!("Transport error: {:?}", err);
        ClientError::Transport(format!("Transport error: {}", err))
    }
}
