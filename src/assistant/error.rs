//! Assistant API error types

use std::time::Duration;
use thiserror::Error;

/// Assistant API error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AssistantError {
    pub kind: AssistantErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl AssistantError {
    pub fn new(kind: AssistantErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::Network, message)
    }

    #[cfg(test)]
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::RateLimit, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::InvalidResponse, message)
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let kind = match status {
            401 | 403 => AssistantErrorKind::Auth,
            404 => AssistantErrorKind::NotFound,
            429 => AssistantErrorKind::RateLimit,
            400..=499 => AssistantErrorKind::InvalidRequest,
            500..=599 => AssistantErrorKind::ServerError,
            _ => AssistantErrorKind::Unknown,
        };
        let message = format!("Assistant API returned {status}: {}", extract_message(body));
        let error = Self::new(kind, message);
        match retry_after {
            Some(d) => error.with_retry_after(d),
            None => error,
        }
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw text
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Rate limited (429) - retryable with backoff
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Thread, run or assistant does not exist
    NotFound,
    /// Bad request (400) - not retryable
    InvalidRequest,
    /// Response body could not be decoded
    InvalidResponse,
    Unknown,
}

impl AssistantErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}
