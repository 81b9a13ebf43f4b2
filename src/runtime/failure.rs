//! Turn failures and their caller-facing classification

use crate::assistant::{AssistantError, AssistantErrorKind, RunStatus};
use std::time::Duration;
use thiserror::Error;

/// Suggested backoff when the upstream gives none
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

const TIMEOUT_MESSAGE: &str = "The assistant took too long to respond. Please try again.";
const RATE_LIMIT_MESSAGE: &str =
    "The assistant is receiving too many requests right now. Please wait a minute and try again.";

/// Why a turn did not produce a final message
#[derive(Debug, Error)]
pub enum TurnFailure {
    /// The run reached a terminal state other than `completed`
    #[error("{message}")]
    RunEnded {
        status: RunStatus,
        code: String,
        message: String,
    },
    #[error("Run still unfinished after {attempts} status checks")]
    PollTimeout { attempts: u32 },
    #[error(transparent)]
    Upstream(#[from] AssistantError),
    #[error("State store error: {0}")]
    Store(String),
    #[error("Turn cancelled: the service is shutting down")]
    Cancelled,
    #[error("Agent not found: {0}")]
    AgentNotFound(String),
}

impl TurnFailure {
    /// Run status to record on the session for this failure, if any
    pub fn run_status(&self) -> Option<RunStatus> {
        match self {
            Self::RunEnded { status, .. } => Some(*status),
            Self::PollTimeout { .. } => Some(RunStatus::Expired),
            Self::Cancelled => Some(RunStatus::Cancelled),
            Self::Upstream(_) | Self::Store(_) | Self::AgentNotFound(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Retryable after the suggested backoff
    RateLimit,
    /// Retryable; the run exceeded the poll budget
    Timeout,
    Fatal,
}

/// Caller-facing verdict for a failed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    pub category: FailureCategory,
    /// Stable machine-readable code for the response payload
    pub error_code: &'static str,
    pub message: String,
    pub retry_after: Option<Duration>,
    pub http_status: u16,
}

impl ClassifiedFailure {
    pub fn is_retryable(&self) -> bool {
        self.category != FailureCategory::Fatal
    }

    fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self {
            category: FailureCategory::RateLimit,
            error_code: "rate_limit",
            message: RATE_LIMIT_MESSAGE.to_string(),
            retry_after: Some(retry_after.unwrap_or(RATE_LIMIT_BACKOFF)),
            http_status: 429,
        }
    }

    fn fatal(error_code: &'static str, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            category: FailureCategory::Fatal,
            error_code,
            message: message.into(),
            retry_after: None,
            http_status,
        }
    }
}

fn is_rate_limit(code: &str, message: &str) -> bool {
    code == "rate_limit_exceeded" || message.to_lowercase().contains("rate limit")
}

pub fn classify(failure: &TurnFailure) -> ClassifiedFailure {
    match failure {
        TurnFailure::RunEnded { code, message, .. } if is_rate_limit(code, message) => {
            ClassifiedFailure::rate_limit(None)
        }
        TurnFailure::RunEnded { message, .. } => {
            ClassifiedFailure::fatal("run_failed", message.clone(), 500)
        }
        TurnFailure::PollTimeout { .. } => ClassifiedFailure {
            category: FailureCategory::Timeout,
            error_code: "timeout",
            message: TIMEOUT_MESSAGE.to_string(),
            retry_after: None,
            http_status: 504,
        },
        TurnFailure::Upstream(e)
            if e.kind == AssistantErrorKind::RateLimit || is_rate_limit("", &e.message) =>
        {
            ClassifiedFailure::rate_limit(e.retry_after)
        }
        TurnFailure::Upstream(e) => ClassifiedFailure::fatal("internal", e.message.clone(), 500),
        TurnFailure::Store(_) => {
            ClassifiedFailure::fatal("internal", "Session state could not be saved", 500)
        }
        TurnFailure::Cancelled => ClassifiedFailure::fatal("run_failed", failure.to_string(), 500),
        TurnFailure::AgentNotFound(_) => {
            ClassifiedFailure::fatal("agent_not_found", failure.to_string(), 404)
        }
    }
}
