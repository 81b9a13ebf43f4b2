//! lexdraft - assistant-driven legal document drafting service
//!
//! Runs conversation turns against an external assistant, answers its
//! tool calls, keeps per-session state and renders the final document.

mod api;
mod assistant;
mod collaborators;
mod config;
mod db;
mod normalize;
mod runtime;
mod synthesis;
mod tools;

use api::{create_router, AppState};
use assistant::{AssistantClient, LoggingClient, OpenAiAssistants};
use collaborators::{
    Collaborators, DocumentTracker, HttpDocumentTracker, HttpSearchProvider, LedgerTracker,
    SearchProvider,
};
use config::AppConfig;
use db::Database;
use runtime::{DatabaseStorage, TurnExecutor};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lexdraft=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    if config.assistant.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; assistant calls will be rejected upstream");
    }
    let assistant: Arc<dyn AssistantClient> =
        Arc::new(LoggingClient::new(OpenAiAssistants::new(&config.assistant)?));

    let search: Option<Arc<dyn SearchProvider>> = match &config.search_url {
        Some(url) => Some(Arc::new(HttpSearchProvider::new(url.as_str())?)),
        None => {
            tracing::info!("No search service configured; search_sources will be unavailable");
            None
        }
    };
    let tracker: Arc<dyn DocumentTracker> = match &config.tracking_url {
        Some(url) => Arc::new(HttpDocumentTracker::new(url.as_str())?),
        None => {
            tracing::info!("No tracking service configured; using the local document ledger");
            Arc::new(LedgerTracker::new(db.clone()))
        }
    };

    let shutdown = CancellationToken::new();
    let storage = Arc::new(DatabaseStorage::new(db.clone()));
    let executor = TurnExecutor::new(
        storage.clone(),
        assistant,
        storage,
        Collaborators { search, tracker },
        config.poll,
        config.default_sla_hours,
    )
    .with_shutdown(shutdown.clone());

    let state = AppState::new(db, executor);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        poll_interval_ms = config.poll.interval.as_millis(),
        max_poll_attempts = config.poll.max_attempts,
        "lexdraft server listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down; cancelling in-flight turns");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
