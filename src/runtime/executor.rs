//! Turn executor: one user message in, one assistant message out

use super::failure::TurnFailure;
use super::poll::{next_step, PollBudget, PollStep};
use super::traits::{SessionStore, Storage, UsageMetrics};
use super::UserContext;

use crate::assistant::{AssistantClient, MessageRole, Run, RunStatus};
use crate::collaborators::Collaborators;
use crate::db::{AgentRecord, SessionKey, SessionRecord, SessionStatus, StateDelta, UserContact};
use crate::tools::{dispatch_batch, ToolContext};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// One incoming message for a session
#[derive(Debug, Clone)]
pub struct Turn {
    pub agent_id: String,
    /// Existing thread; a new one is created when absent
    pub thread_id: Option<String>,
    pub message: String,
    pub user: Option<UserContext>,
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub message: String,
    pub run_status: RunStatus,
    pub thread_id: String,
    pub conversation_complete: bool,
}

/// Runs turns against storage, the assistant and the usage metrics sink
pub struct TurnExecutor<S, A, M>
where
    S: Storage + 'static,
    A: AssistantClient + ?Sized + 'static,
    M: UsageMetrics + 'static,
{
    store: Arc<S>,
    assistant: Arc<A>,
    metrics: Arc<M>,
    collaborators: Collaborators,
    budget: PollBudget,
    default_sla_hours: u32,
    shutdown: CancellationToken,
}

impl<S, A, M> TurnExecutor<S, A, M>
where
    S: Storage + 'static,
    A: AssistantClient + ?Sized + 'static,
    M: UsageMetrics + 'static,
{
    pub fn new(
        store: Arc<S>,
        assistant: Arc<A>,
        metrics: Arc<M>,
        collaborators: Collaborators,
        budget: PollBudget,
        default_sla_hours: u32,
    ) -> Self {
        Self {
            store,
            assistant,
            metrics,
            collaborators,
            budget,
            default_sla_hours,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop in-flight poll loops when this token is cancelled
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn execute_turn(&self, turn: Turn) -> Result<TurnOutcome, TurnFailure> {
        let agent = self
            .store
            .get_agent(&turn.agent_id)
            .await
            .map_err(TurnFailure::Store)?
            .ok_or_else(|| TurnFailure::AgentNotFound(turn.agent_id.clone()))?;
        let agent = Arc::new(agent);

        let result = self.run_turn(&agent, turn).await;
        self.record_usage(&agent.id, result.is_ok()).await;

        match &result {
            Ok(outcome) => tracing::info!(
                agent_id = %agent.id,
                thread_id = %outcome.thread_id,
                complete = outcome.conversation_complete,
                "Turn completed"
            ),
            Err(e) => tracing::warn!(agent_id = %agent.id, error = %e, "Turn failed"),
        }
        result
    }

    async fn run_turn(
        &self,
        agent: &Arc<AgentRecord>,
        turn: Turn,
    ) -> Result<TurnOutcome, TurnFailure> {
        let thread_id = match turn.thread_id.filter(|t| !t.trim().is_empty()) {
            Some(thread_id) => thread_id,
            None => {
                let thread_id = self.assistant.create_thread().await?;
                tracing::info!(thread_id = %thread_id, agent_id = %agent.id, "Created thread");
                thread_id
            }
        };
        let key = SessionKey::new(thread_id.clone(), agent.id.clone());

        self.reconcile(&key).await?;
        let record = match self.store.get_session(&key).await.map_err(TurnFailure::Store)? {
            Some(record) => record,
            None => self
                .store
                .create_session(&key)
                .await
                .map_err(TurnFailure::Store)?,
        };

        if let Some(user) = turn.user.as_ref() {
            self.prime_identity(&key, &record, user).await?;
        }

        self.assistant
            .add_message(&thread_id, MessageRole::User, &turn.message)
            .await?;
        let run = self
            .assistant
            .create_run(&thread_id, &agent.assistant_id)
            .await?;
        tracing::info!(thread_id = %thread_id, run_id = %run.id, "Run started");

        let store: Arc<dyn SessionStore> = self.store.clone();
        let ctx = ToolContext::new(
            key.clone(),
            Arc::clone(agent),
            turn.user,
            store,
            self.collaborators.clone(),
            self.default_sla_hours,
        );
        if let Err(failure) = self.poll_run(&ctx, &run).await {
            self.record_failed_run(&key, &run, &failure).await;
            return Err(failure);
        }

        let message = self
            .assistant
            .latest_assistant_message(&thread_id)
            .await?
            .unwrap_or_default();

        // Tool handlers may have raced another writer during the run
        self.reconcile(&key).await?;
        let delta = StateDelta {
            last_message: Some(message.clone()),
            run_status: Some(RunStatus::Completed),
            run_id: Some(run.id.clone()),
            ..StateDelta::default()
        };
        let record = self
            .store
            .merge_write(&key, &delta)
            .await
            .map_err(TurnFailure::Store)?;

        Ok(TurnOutcome {
            message,
            run_status: RunStatus::Completed,
            thread_id,
            conversation_complete: record.status == SessionStatus::Completed,
        })
    }

    /// Tell the assistant who the signed-in caller is, once per identity
    async fn prime_identity(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
        user: &UserContext,
    ) -> Result<(), TurnFailure> {
        let Some((name, email)) = user.identity() else {
            return Ok(());
        };
        let already_primed = record
            .user_contact
            .as_ref()
            .is_some_and(|c| c.authenticated && c.email == email);
        if already_primed {
            return Ok(());
        }

        let context = format!(
            "[Context] The user is signed in as {name} <{email}>. Use this identity as the \
             requester; do not ask for their name or email."
        );
        self.assistant
            .add_message(&key.thread_id, MessageRole::User, &context)
            .await?;
        let contact = UserContact {
            name: name.to_string(),
            email: email.to_string(),
            authenticated: true,
        };
        self.store
            .merge_write(key, &StateDelta::contact(contact))
            .await
            .map_err(TurnFailure::Store)?;
        tracing::debug!(thread_id = %key.thread_id, "Primed authenticated identity");
        Ok(())
    }

    /// Drive the run to a terminal state, answering tool calls on the way
    ///
    /// The attempt cap is authoritative; the wall-clock deadline only
    /// bounds time lost to slow tool handlers or upstream calls.
    async fn poll_run(&self, ctx: &ToolContext, run: &Run) -> Result<(), TurnFailure> {
        let thread_id = ctx.session.thread_id.as_str();
        let deadline = Instant::now() + self.budget.deadline();
        let mut ticker = tokio::time::interval(self.budget.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts = 0;
        while attempts < self.budget.max_attempts {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Err(TurnFailure::Cancelled),
                () = tokio::time::sleep_until(deadline) => break,
                _ = ticker.tick() => {}
            }
            attempts += 1;

            let current = self.assistant.get_run(thread_id, &run.id).await?;
            match next_step(&current) {
                PollStep::Continue => {}
                PollStep::DispatchTools(calls) => {
                    tracing::debug!(
                        thread_id = %thread_id,
                        run_id = %run.id,
                        calls = calls.len(),
                        attempt = attempts,
                        "Answering tool calls"
                    );
                    let outputs = dispatch_batch(&calls, ctx).await;
                    self.assistant
                        .submit_tool_outputs(thread_id, &run.id, &outputs)
                        .await?;
                }
                PollStep::Completed => {
                    tracing::debug!(run_id = %run.id, attempts, "Run completed");
                    return Ok(());
                }
                PollStep::Ended {
                    status,
                    code,
                    message,
                } => {
                    return Err(TurnFailure::RunEnded {
                        status,
                        code,
                        message,
                    })
                }
            }
        }

        tracing::warn!(run_id = %run.id, attempts, "Run exceeded poll budget");
        Err(TurnFailure::PollTimeout { attempts })
    }

    async fn reconcile(&self, key: &SessionKey) -> Result<(), TurnFailure> {
        self.store
            .reconcile(key)
            .await
            .map(|_| ())
            .map_err(TurnFailure::Store)
    }

    /// Best-effort: the turn already failed, a storage error here is only logged
    async fn record_failed_run(&self, key: &SessionKey, run: &Run, failure: &TurnFailure) {
        let Some(status) = failure.run_status() else {
            return;
        };
        if let Err(e) = self.store.reconcile(key).await {
            tracing::warn!(thread_id = %key.thread_id, error = %e, "Failed to reconcile session rows");
        }
        let delta = StateDelta {
            run_status: Some(status),
            run_id: Some(run.id.clone()),
            ..StateDelta::default()
        };
        if let Err(e) = self.store.merge_write(key, &delta).await {
            tracing::warn!(thread_id = %key.thread_id, error = %e, "Failed to record run status");
        }
    }

    /// Best-effort usage counters
    async fn record_usage(&self, agent_id: &str, success: bool) {
        match self.metrics.record_turn(agent_id, success).await {
            Ok(snapshot) => tracing::debug!(
                agent_id,
                usage_count = snapshot.usage_count,
                success_rate = snapshot.success_rate,
                "Usage recorded"
            ),
            Err(e) => tracing::warn!(agent_id, error = %e, "Failed to record usage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantError, ToolCallRequest};
    use crate::db::{Database, NewAgent};
    use crate::runtime::testing::{
        FailingMetrics, MockAssistant, MockSearch, MockTracker, RecordingMetrics,
    };
    use crate::runtime::failure::FailureCategory;
    use crate::runtime::{classify, DatabaseStorage};
    use crate::tools::test_support::agent;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    struct Harness<M: UsageMetrics + 'static> {
        db: Database,
        assistant: Arc<MockAssistant>,
        metrics: Arc<M>,
        executor: TurnExecutor<DatabaseStorage, MockAssistant, M>,
    }

    fn harness_with<M: UsageMetrics + 'static>(metrics: M) -> Harness<M> {
        let db = Database::open_in_memory().unwrap();
        let template = agent();
        db.create_agent(&NewAgent {
            id: Some(template.id.clone()),
            name: template.name,
            assistant_id: template.assistant_id,
            document_type: template.document_type,
            template: template.template,
            price: template.price,
            sla_hours: template.sla_hours,
        })
        .unwrap();

        let assistant = Arc::new(MockAssistant::new());
        let metrics = Arc::new(metrics);
        let collaborators = Collaborators {
            search: Some(Arc::new(MockSearch::new())),
            tracker: Arc::new(MockTracker::new()),
        };
        let executor = TurnExecutor::new(
            Arc::new(DatabaseStorage::new(db.clone())),
            assistant.clone(),
            metrics.clone(),
            collaborators,
            PollBudget::default(),
            24,
        );
        Harness {
            db,
            assistant,
            metrics,
            executor,
        }
    }

    fn harness() -> Harness<RecordingMetrics> {
        harness_with(RecordingMetrics::default())
    }

    fn turn(thread_id: Option<&str>, message: &str) -> Turn {
        Turn {
            agent_id: "agent-1".to_string(),
            thread_id: thread_id.map(str::to_string),
            message: message.to_string(),
            user: None,
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_completion_creates_thread_and_session() {
        let h = harness();
        h.assistant.queue_status(RunStatus::InProgress);
        h.assistant.queue_status(RunStatus::Completed);
        h.assistant.set_final_message(Some("¿Cuál es su nombre?"));

        let outcome = h.executor.execute_turn(turn(None, "Hola")).await.unwrap();
        assert_eq!(outcome.message, "¿Cuál es su nombre?");
        assert_eq!(outcome.run_status, RunStatus::Completed);
        assert_eq!(outcome.thread_id, "thread-1");
        assert!(!outcome.conversation_complete);
        assert_eq!(h.assistant.get_run_count(), 2);

        let record = h
            .db
            .get_session(&SessionKey::new("thread-1", "agent-1"))
            .unwrap()
            .unwrap();
        assert_eq!(record.last_message.as_deref(), Some("¿Cuál es su nombre?"));
        assert_eq!(record.run_status, Some(RunStatus::Completed));
        assert_eq!(record.run_id.as_deref(), Some("run-1"));

        assert_eq!(h.metrics.recorded(), vec![("agent-1".to_string(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_thread_is_reused() {
        let h = harness();
        h.assistant.queue_status(RunStatus::Completed);

        let outcome = h
            .executor
            .execute_turn(turn(Some("thread-9"), "Hola"))
            .await
            .unwrap();
        assert_eq!(outcome.thread_id, "thread-9");
        assert_eq!(h.assistant.threads_created(), 0);
        let messages = h.assistant.recorded_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "thread-9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_calls_are_answered_and_persisted() {
        let h = harness();
        h.assistant.queue_run(
            Run::new("run-1", "thread-1", RunStatus::RequiresAction).with_tool_calls(vec![
                tool_call(
                    "call_1",
                    "store_collected_data",
                    r#"{"data": {"NAME": "ana gómez", "CITY": "cali"}}"#,
                ),
                tool_call("call_2", "draft_contract", "{}"),
            ]),
        );
        h.assistant.queue_status(RunStatus::Completed);

        let outcome = h.executor.execute_turn(turn(None, "Soy Ana, de Cali")).await.unwrap();
        assert_eq!(outcome.run_status, RunStatus::Completed);

        let submissions = h.assistant.recorded_submissions();
        assert_eq!(submissions.len(), 1);
        let batch = &submissions[0];
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].tool_call_id, "call_1");
        assert!(batch[0].output.starts_with("Stored 2 value(s)"));
        assert_eq!(batch[1].tool_call_id, "call_2");
        assert!(batch[1].output.contains("not implemented"));

        // Tool writes survive the end-of-turn merge
        let record = h
            .db
            .get_session(&SessionKey::new("thread-1", "agent-1"))
            .unwrap()
            .unwrap();
        assert_eq!(record.placeholder_mapping["CITY"], "CALI, VALLE DEL CAUCA");
        assert_eq!(record.last_message.as_deref(), Some("Listo."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_bound_is_exactly_max_attempts() {
        let h = harness();
        // Never leaves in_progress
        h.assistant.queue_status(RunStatus::InProgress);

        let failure = h.executor.execute_turn(turn(None, "Hola")).await.unwrap_err();
        assert!(matches!(failure, TurnFailure::PollTimeout { attempts: 60 }));
        assert_eq!(h.assistant.get_run_count(), 60);

        let classified = classify(&failure);
        assert_eq!(classified.category, FailureCategory::Timeout);
        assert!(classified.is_retryable());

        let record = h
            .db
            .get_session(&SessionKey::new("thread-1", "agent-1"))
            .unwrap()
            .unwrap();
        assert_eq!(record.run_status, Some(RunStatus::Expired));
        assert_eq!(h.metrics.recorded(), vec![("agent-1".to_string(), false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_run_is_classified() {
        let h = harness();
        h.assistant.queue_run(
            Run::new("run-1", "thread-1", RunStatus::Failed)
                .with_error("server_error", "Rate limit reached for requests"),
        );

        let failure = h.executor.execute_turn(turn(None, "Hola")).await.unwrap_err();
        let classified = classify(&failure);
        assert_eq!(classified.category, FailureCategory::RateLimit);
        assert_eq!(classified.retry_after, Some(Duration::from_secs(60)));
        assert_eq!(classified.http_status, 429);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_message_is_verbatim() {
        let h = harness();
        h.assistant.queue_run(
            Run::new("run-1", "thread-1", RunStatus::Failed)
                .with_error("server_error", "The model produced invalid content"),
        );

        let failure = h.executor.execute_turn(turn(None, "Hola")).await.unwrap_err();
        let classified = classify(&failure);
        assert_eq!(classified.category, FailureCategory::Fatal);
        assert_eq!(classified.message, "The model produced invalid content");

        let record = h
            .db
            .get_session(&SessionKey::new("thread-1", "agent-1"))
            .unwrap()
            .unwrap();
        assert_eq!(record.run_status, Some(RunStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_fails_turn() {
        let h = harness();
        h.assistant
            .fail_create_run(AssistantError::rate_limit("Too many requests"));

        let failure = h.executor.execute_turn(turn(None, "Hola")).await.unwrap_err();
        assert_eq!(classify(&failure).category, FailureCategory::RateLimit);
        assert_eq!(h.assistant.get_run_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_agent() {
        let h = harness();
        let mut request = turn(None, "Hola");
        request.agent_id = "missing".to_string();

        let failure = h.executor.execute_turn(request).await.unwrap_err();
        assert!(matches!(failure, TurnFailure::AgentNotFound(_)));
        assert_eq!(h.assistant.threads_created(), 0);
        assert!(h.metrics.recorded().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticated_identity_is_primed_once() {
        let h = harness();
        h.assistant.queue_status(RunStatus::Completed);
        let mut request = turn(None, "Hola");
        request.user = Some(UserContext {
            is_authenticated: true,
            name: Some("Ana Gómez".to_string()),
            email: Some("ana@example.com".to_string()),
        });

        h.executor.execute_turn(request.clone()).await.unwrap();
        let messages = h.assistant.recorded_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].2.contains("Ana Gómez <ana@example.com>"));
        assert_eq!(messages[1].2, "Hola");

        let key = SessionKey::new("thread-1", "agent-1");
        let record = h.db.get_session(&key).unwrap().unwrap();
        assert!(record.is_authenticated());

        // Second turn on the same thread does not prime again
        request.thread_id = Some("thread-1".to_string());
        request.message = "Sigo aquí".to_string();
        h.executor.execute_turn(request).await.unwrap();
        assert_eq!(h.assistant.recorded_messages().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_rows_are_reconciled() {
        let h = harness();
        let key = SessionKey::new("thread-7", "agent-1");
        let now = Utc::now();
        h.db.insert_session_at(&key, now - ChronoDuration::seconds(30))
            .unwrap();
        h.db.insert_session_at(&key, now - ChronoDuration::seconds(10))
            .unwrap();
        h.db.insert_session_at(&key, now - ChronoDuration::seconds(20))
            .unwrap();
        assert_eq!(h.db.list_session_rows(&key).unwrap().len(), 3);

        h.assistant.queue_status(RunStatus::Completed);
        h.executor
            .execute_turn(turn(Some("thread-7"), "Hola"))
            .await
            .unwrap();

        let rows = h.db.list_session_rows(&key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_message.as_deref(), Some("Listo."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_created_mid_run_is_reconciled_before_persist() {
        let h = harness();
        let key = SessionKey::new("thread-1", "agent-1");
        let db = h.db.clone();
        let racing_key = key.clone();
        h.assistant.on_next_get_run(move || {
            db.insert_session_at(&racing_key, Utc::now() + ChronoDuration::seconds(5))
                .unwrap();
        });
        h.assistant.queue_status(RunStatus::Completed);

        h.executor.execute_turn(turn(None, "Hola")).await.unwrap();

        let rows = h.db.list_session_rows(&key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_message.as_deref(), Some("Listo."));
        assert_eq!(rows[0].run_status, Some(RunStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_status_is_written_after_reconcile() {
        let h = harness();
        let key = SessionKey::new("thread-1", "agent-1");
        let db = h.db.clone();
        let racing_key = key.clone();
        h.assistant.on_next_get_run(move || {
            db.insert_session_at(&racing_key, Utc::now() + ChronoDuration::seconds(5))
                .unwrap();
        });
        h.assistant.queue_run(
            Run::new("run-1", "thread-1", RunStatus::Failed).with_error("server_error", "Boom"),
        );

        let failure = h.executor.execute_turn(turn(None, "Hola")).await.unwrap_err();
        assert!(matches!(failure, TurnFailure::RunEnded { .. }));

        let rows = h.db.list_session_rows(&key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].run_status, Some(RunStatus::Failed));
        assert_eq!(rows[0].run_id.as_deref(), Some("run-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_failure_is_not_fatal() {
        let h = harness_with(FailingMetrics);
        h.assistant.queue_status(RunStatus::Completed);

        let outcome = h.executor.execute_turn(turn(None, "Hola")).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_poll_loop() {
        let h = harness();
        let shutdown = CancellationToken::new();
        let executor = h.executor.with_shutdown(shutdown.clone());
        h.assistant.queue_status(RunStatus::InProgress);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5_500)).await;
            shutdown.cancel();
        });
        let failure = executor.execute_turn(turn(None, "Hola")).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(failure, TurnFailure::Cancelled));
        assert_eq!(h.assistant.get_run_count(), 6);
        let record = h
            .db
            .get_session(&SessionKey::new("thread-1", "agent-1"))
            .unwrap()
            .unwrap();
        assert_eq!(record.run_status, Some(RunStatus::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_document_marks_conversation_complete() {
        let h = harness();
        let key = SessionKey::new("thread-3", "agent-1");
        h.db.create_session(&key).unwrap();
        h.db.merge_write(
            &key,
            &StateDelta::data(
                [("NAME", "Ana Gómez"), ("CITY", "cali")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                Default::default(),
                true,
            ),
        )
        .unwrap();

        h.assistant.queue_run(
            Run::new("run-1", "thread-3", RunStatus::RequiresAction)
                .with_tool_calls(vec![tool_call("call_1", "generate_document", "")]),
        );
        h.assistant.queue_status(RunStatus::Completed);

        let mut request = turn(Some("thread-3"), "Genera el documento");
        request.user = Some(UserContext {
            is_authenticated: true,
            name: Some("Ana Gómez".to_string()),
            email: Some("ana@example.com".to_string()),
        });
        let outcome = h.executor.execute_turn(request).await.unwrap();

        let submissions = h.assistant.recorded_submissions();
        assert!(submissions[0][0].output.contains("Tracking ID: trk-1"));
        assert!(outcome.conversation_complete);
    }
}
