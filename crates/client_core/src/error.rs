//! Errors surfaced by the survey HTTP client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No response was received (DNS, refused connection, TLS, reset).
    #[error("network/server connection failed: {0}")]
    Network(String),
    /// The server answered with a non-2xx status.
    #[error("[{status} {status_text}] {message}")]
    Rejected {
        status: u16,
        status_text: String,
        message: String,
    },
    /// A response arrived but could not be read as the expected document.
    #[error("unexpected response from server: {0}")]
    Decode(String),
    #[error("no candidate urls to fetch")]
    NoCandidateUrls,
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ClientError {
    pub fn rejected(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            message: message.into(),
        }
    }

    /// Text suitable for an alert or banner.
    pub fn explain(&self) -> String {
        match self {
            ClientError::Network(_) => "network/server connection failed".to_string(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::rejected(status, "")
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
