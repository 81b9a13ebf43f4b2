//! Mock implementations for testing
//!
//! These mocks enable turn and tool tests without real I/O.

use super::traits::*;
use crate::assistant::{
    AssistantClient, AssistantError, MessageRole, Run, RunStatus, ToolOutputSubmission,
};
use crate::collaborators::{
    DocumentTracker, SearchProvider, SearchQuery, SearchResults, TrackingReceipt, TrackingRequest,
};
use crate::db::UsageSnapshot;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

// ============================================================================
// Mock Assistant
// ============================================================================

/// Scripted assistant: `get_run` pops queued snapshots, then repeats the last one
pub struct MockAssistant {
    runs: Mutex<VecDeque<Result<Run, AssistantError>>>,
    last_run: Mutex<Option<Run>>,
    create_run_error: Mutex<Option<AssistantError>>,
    final_message: Mutex<Option<String>>,
    threads_created: AtomicU32,
    get_run_calls: AtomicU32,
    /// Runs once, on the next `get_run`
    before_get_run: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    /// Every message added, as (thread, role, content)
    pub messages: Mutex<Vec<(String, MessageRole, String)>>,
    /// Every batch of tool outputs submitted
    pub submissions: Mutex<Vec<Vec<ToolOutputSubmission>>>,
}

#[allow(dead_code)]
impl MockAssistant {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(VecDeque::new()),
            last_run: Mutex::new(None),
            create_run_error: Mutex::new(None),
            final_message: Mutex::new(Some("Listo.".to_string())),
            threads_created: AtomicU32::new(0),
            get_run_calls: AtomicU32::new(0),
            before_get_run: Mutex::new(None),
            messages: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Queue a run snapshot for the next `get_run`
    pub fn queue_run(&self, run: Run) {
        self.runs.lock().unwrap().push_back(Ok(run));
    }

    /// Queue a snapshot with just a status
    pub fn queue_status(&self, status: RunStatus) {
        self.queue_run(Run::new("run-1", "thread-1", status));
    }

    /// Queue an error for the next `get_run`
    pub fn queue_error(&self, error: AssistantError) {
        self.runs.lock().unwrap().push_back(Err(error));
    }

    /// Run `hook` while the run is being polled, e.g. to simulate a racing writer
    pub fn on_next_get_run(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_get_run.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn fail_create_run(&self, error: AssistantError) {
        *self.create_run_error.lock().unwrap() = Some(error);
    }

    pub fn set_final_message(&self, message: Option<&str>) {
        *self.final_message.lock().unwrap() = message.map(str::to_string);
    }

    pub fn get_run_count(&self) -> u32 {
        self.get_run_calls.load(Ordering::SeqCst)
    }

    pub fn threads_created(&self) -> u32 {
        self.threads_created.load(Ordering::SeqCst)
    }

    pub fn recorded_messages(&self) -> Vec<(String, MessageRole, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn recorded_submissions(&self) -> Vec<Vec<ToolOutputSubmission>> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistantClient for MockAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread-{n}"))
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        self.messages
            .lock()
            .unwrap()
            .push((thread_id.to_string(), role, content.to_string()));
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<Run, AssistantError> {
        if let Some(error) = self.create_run_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(Run::new("run-1", thread_id, RunStatus::Queued))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        self.get_run_calls.fetch_add(1, Ordering::SeqCst);
        let hook = self.before_get_run.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let next = self.runs.lock().unwrap().pop_front();
        match next {
            Some(Ok(run)) => {
                *self.last_run.lock().unwrap() = Some(run.clone());
                Ok(run)
            }
            Some(Err(error)) => Err(error),
            None => Ok(self
                .last_run
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Run::new(run_id, thread_id, RunStatus::InProgress))),
        }
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutputSubmission],
    ) -> Result<Run, AssistantError> {
        self.submissions.lock().unwrap().push(outputs.to_vec());
        Ok(Run::new(run_id, thread_id, RunStatus::Queued))
    }

    async fn latest_assistant_message(
        &self,
        _thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        Ok(self.final_message.lock().unwrap().clone())
    }
}

// ============================================================================
// Mock Collaborators
// ============================================================================

/// Search provider returning canned results
pub struct MockSearch {
    results: Mutex<Result<SearchResults, String>>,
    queries: Mutex<Vec<SearchQuery>>,
}

#[allow(dead_code)]
impl MockSearch {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Ok(SearchResults::default())),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn set_results(&self, results: SearchResults) {
        *self.results.lock().unwrap() = Ok(results);
    }

    pub fn fail_with(&self, error: &str) {
        *self.results.lock().unwrap() = Err(error.to_string());
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, String> {
        self.queries.lock().unwrap().push(query.clone());
        self.results.lock().unwrap().clone()
    }
}

/// Tracker issuing sequential `trk-N` ids at a fixed price
pub struct MockTracker {
    price: i64,
    error: Mutex<Option<String>>,
    requests: Mutex<Vec<TrackingRequest>>,
}

#[allow(dead_code)]
impl MockTracker {
    pub fn new() -> Self {
        Self {
            price: 50_000,
            error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_with(&self, error: &str) {
        *self.error.lock().unwrap() = Some(error.to_string());
    }

    pub fn requests(&self) -> Vec<TrackingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentTracker for MockTracker {
    async fn track(&self, request: &TrackingRequest) -> Result<TrackingReceipt, String> {
        if let Some(error) = self.error.lock().unwrap().clone() {
            return Err(error);
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(TrackingReceipt {
            tracking_id: format!("trk-{}", requests.len()),
            price: self.price,
            sla_deadline: Utc::now() + Duration::hours(i64::from(request.sla_hours)),
        })
    }
}

// ============================================================================
// Mock Metrics
// ============================================================================

/// Metrics sink that records every turn outcome
#[derive(Default)]
pub struct RecordingMetrics {
    pub turns: Mutex<Vec<(String, bool)>>,
}

#[allow(dead_code)]
impl RecordingMetrics {
    pub fn recorded(&self) -> Vec<(String, bool)> {
        self.turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageMetrics for RecordingMetrics {
    async fn record_turn(&self, agent_id: &str, success: bool) -> Result<UsageSnapshot, String> {
        let mut turns = self.turns.lock().unwrap();
        turns.push((agent_id.to_string(), success));
        let count = i64::try_from(turns.len()).unwrap_or(i64::MAX);
        Ok(UsageSnapshot {
            usage_count: count,
            success_rate: 100.0,
        })
    }
}

/// Metrics sink that always fails
pub struct FailingMetrics;

#[async_trait]
impl UsageMetrics for FailingMetrics {
    async fn record_turn(&self, _agent_id: &str, _success: bool) -> Result<UsageSnapshot, String> {
        Err("metrics store unavailable".to_string())
    }
}
