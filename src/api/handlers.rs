//! HTTP request handlers

use super::types::{ErrorResponse, FailurePayload, SessionQuery, TurnRequest, TurnResponse};
use super::AppState;
use crate::db::{AgentRecord, DbError, NewAgent, SessionKey, SessionRecord};
use crate::runtime::{classify, Turn, TurnFailure};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Turn execution
        .route("/api/chat", post(chat))
        // Owning agent records
        .route("/api/agents", post(create_agent))
        .route("/api/agents/:id", get(get_agent))
        // Session state
        .route("/api/sessions/:thread_id", get(get_session))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Turn execution
// ============================================================

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Response, AppError> {
    let Some(message) = request.latest_user_message() else {
        return Err(AppError::BadRequest(
            "messages must include a non-empty user message".to_string(),
        ));
    };
    if request.agent_id.trim().is_empty() {
        return Err(AppError::BadRequest("agentId is required".to_string()));
    }

    let turn = Turn {
        agent_id: request.agent_id.clone(),
        thread_id: request.session_id.clone(),
        message: message.to_string(),
        user: request.user_context.clone(),
    };

    match state.executor.execute_turn(turn).await {
        Ok(outcome) => Ok(Json(TurnResponse {
            success: true,
            message: outcome.message,
            session_id: outcome.thread_id,
            run_status: outcome.run_status,
            conversation_complete: outcome.conversation_complete,
        })
        .into_response()),
        Err(failure) => Ok(failure_response(&failure)),
    }
}

fn failure_response(failure: &TurnFailure) -> Response {
    let classified = classify(failure);
    if let TurnFailure::Store(e) = failure {
        tracing::error!(error = %e, "Turn failed on state store");
    }
    tracing::info!(
        code = classified.error_code,
        retryable = classified.is_retryable(),
        "Returning turn failure"
    );

    let status =
        StatusCode::from_u16(classified.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(FailurePayload::from(&classified))).into_response();
    if let Some(retry_after) = classified.retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
    }
    response
}

// ============================================================
// Agents
// ============================================================

async fn create_agent(
    State(state): State<AppState>,
    Json(agent): Json<NewAgent>,
) -> Result<(StatusCode, Json<AgentRecord>), AppError> {
    if agent.name.trim().is_empty() || agent.assistant_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "name and assistantId are required".to_string(),
        ));
    }
    if agent.price < 0 {
        return Err(AppError::BadRequest("price must not be negative".to_string()));
    }

    let record = state.db.create_agent(&agent)?;
    tracing::info!(agent_id = %record.id, document_type = %record.document_type, "Registered agent");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentRecord>, AppError> {
    Ok(Json(state.db.get_agent(&id)?))
}

// ============================================================
// Sessions
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionRecord>, AppError> {
    let key = SessionKey::new(thread_id, query.agent_id);
    state
        .db
        .get_session(&key)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No session {}", key.thread_id)))
}

async fn get_version() -> &'static str {
    concat!("lexdraft ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::AgentNotFound(_) => AppError::NotFound(err.to_string()),
            DbError::AgentExists(_) => AppError::Conflict(err.to_string()),
            _ => {
                tracing::error!(error = %err, "Database error");
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
