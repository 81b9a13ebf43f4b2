//! External assistant API abstraction
//!
//! The assistant is a black box: a thread accumulates messages, a run
//! executes the assistant over it and either finishes with a message or
//! stops in `requires_action` asking for tool outputs.

mod error;
mod openai;
mod types;

pub use error::{AssistantError, AssistantErrorKind};
pub use openai::OpenAiAssistants;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Thread and run operations against the assistant service
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Create a new thread, returning its id
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append a message to a thread
    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError>;

    /// Start a run of the given assistant over the thread
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError>;

    /// Fetch the current run status
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    /// Answer every pending tool call of a run
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run, AssistantError>;

    /// Text of the newest assistant message in the thread
    async fn latest_assistant_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<String>, AssistantError>;
}

#[async_trait]
impl<T: AssistantClient + ?Sized> AssistantClient for Arc<T> {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        (**self).create_thread().await
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        (**self).add_message(thread_id, role, content).await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        (**self).create_run(thread_id, assistant_id).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        (**self).get_run(thread_id, run_id).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run, AssistantError> {
        (**self).submit_tool_outputs(thread_id, run_id, outputs).await
    }

    async fn latest_assistant_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        (**self).latest_assistant_message(thread_id).await
    }
}

/// Logging wrapper for assistant clients
pub struct LoggingClient<C> {
    inner: C,
}

impl<C: AssistantClient> LoggingClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

fn log_outcome<T>(call: &str, thread_id: &str, start: Instant, result: &Result<T, AssistantError>) {
    let duration_ms = start.elapsed().as_millis();
    match result {
        Ok(_) => tracing::debug!(
            call,
            thread_id = %thread_id,
            duration_ms = %duration_ms,
            "Assistant call completed"
        ),
        Err(e) => tracing::warn!(
            call,
            thread_id = %thread_id,
            duration_ms = %duration_ms,
            error = %e.message,
            retryable = e.kind.is_retryable(),
            "Assistant call failed"
        ),
    }
}

#[async_trait]
impl<C: AssistantClient> AssistantClient for LoggingClient<C> {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let start = Instant::now();
        let result = self.inner.create_thread().await;
        let thread_id = result.as_deref().unwrap_or("-");
        log_outcome("create_thread", thread_id, start, &result);
        result
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        let start = Instant::now();
        let result = self.inner.add_message(thread_id, role, content).await;
        log_outcome("add_message", thread_id, start, &result);
        result
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        let start = Instant::now();
        let result = self.inner.create_run(thread_id, assistant_id).await;
        log_outcome("create_run", thread_id, start, &result);
        result
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let start = Instant::now();
        let result = self.inner.get_run(thread_id, run_id).await;
        log_outcome("get_run", thread_id, start, &result);
        result
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run, AssistantError> {
        let start = Instant::now();
        let result = self
            .inner
            .submit_tool_outputs(thread_id, run_id, outputs)
            .await;
        log_outcome("submit_tool_outputs", thread_id, start, &result);
        result
    }

    async fn latest_assistant_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        let start = Instant::now();
        let result = self.inner.latest_assistant_message(thread_id).await;
        log_outcome("latest_assistant_message", thread_id, start, &result);
        result
    }
}
