//! API request and response types

use crate::assistant::RunStatus;
use crate::runtime::{ClassifiedFailure, UserContext};
use serde::{Deserialize, Serialize};

/// One message of the chat transcript sent by the client
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Request to run one turn
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub agent_id: String,
    /// External thread id from a previous turn
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_context: Option<UserContext>,
}

impl TurnRequest {
    /// Content of the newest non-blank user message
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role.eq_ignore_ascii_case("user"))
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty())
    }
}

/// Response for a completed turn
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    pub run_status: RunStatus,
    pub conversation_complete: bool,
}

/// Response for a classified turn failure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePayload {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    /// Seconds to wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&ClassifiedFailure> for FailurePayload {
    fn from(failure: &ClassifiedFailure) -> Self {
        Self {
            success: false,
            error: failure.error_code,
            message: failure.message.clone(),
            retry_after: failure.retry_after.map(|d| d.as_secs()),
        }
    }
}

/// Query for reading a session record
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub agent_id: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
