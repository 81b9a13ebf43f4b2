//! `OpenAI` Assistants (v2) REST implementation

use super::types::{
    MessageRole, Run, RunError, RunStatus, ToolCallRequest, ToolOutputSubmission,
};
use super::{AssistantClient, AssistantError};
use crate::config::AssistantConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Thread/run client for an Assistants-compatible endpoint
pub struct OpenAiAssistants {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAssistants {
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AssistantError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AssistantError> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .map_err(|e| AssistantError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::from_status(
                status.as_u16(),
                &body,
                retry_after,
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AssistantError::invalid_response(format!("Failed to decode response: {e}")))
    }
}

#[async_trait]
impl AssistantClient for OpenAiAssistants {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let thread: WireThread = self
            .send(self.client.post(self.url("threads")).json(&json!({})))
            .await?;
        Ok(thread.id)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        let _: serde_json::Value = self
            .send(
                self.client
                    .post(self.url(&format!("threads/{thread_id}/messages")))
                    .json(&json!({ "role": role.as_str(), "content": content })),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        let run: WireRun = self
            .send(
                self.client
                    .post(self.url(&format!("threads/{thread_id}/runs")))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;
        Ok(run.into_run())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let run: WireRun = self
            .send(
                self.client
                    .get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
            )
            .await?;
        Ok(run.into_run())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run, AssistantError> {
        let run: WireRun = self
            .send(
                self.client
                    .post(self.url(&format!(
                        "threads/{thread_id}/runs/{run_id}/submit_tool_outputs"
                    )))
                    .json(&SubmitToolOutputs {
                        tool_outputs: outputs,
                    }),
            )
            .await?;
        Ok(run.into_run())
    }

    async fn latest_assistant_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        let list: WireMessageList = self
            .send(
                self.client
                    .get(self.url(&format!("threads/{thread_id}/messages")))
                    .query(&[("order", "desc"), ("limit", "10")]),
            )
            .await?;
        Ok(list.latest_assistant_text())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireThread {
    id: String,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputs<'a> {
    tool_outputs: &'a [ToolOutputSubmission],
}

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    thread_id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
    #[serde(default)]
    required_action: Option<WireRequiredAction>,
}

#[derive(Debug, Deserialize)]
struct WireRequiredAction {
    submit_tool_outputs: WireSubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct WireSubmitToolOutputs {
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl WireRun {
    fn into_run(self) -> Run {
        let tool_calls = self
            .required_action
            .map(|action| {
                action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolCallRequest {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Run {
            id: self.id,
            thread_id: self.thread_id,
            status: self.status,
            last_error: self.last_error,
            tool_calls,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMessageList {
    #[serde(default)]
    data: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: MessageRole,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text {
        text: WireText,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireText {
    value: String,
}

impl WireMessageList {
    /// Messages arrive newest first
    fn latest_assistant_text(self) -> Option<String> {
        self.data
            .into_iter()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|c| match c {
                        WireContent::Text { text } => Some(text.value),
                        WireContent::Other => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
    }
}
