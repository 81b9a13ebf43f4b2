//! HTTP API for lexdraft

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::runtime::ProductionExecutor;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub executor: Arc<ProductionExecutor>,
}

impl AppState {
    pub fn new(db: Database, executor: ProductionExecutor) -> Self {
        Self {
            db,
            executor: Arc::new(executor),
        }
    }
}
