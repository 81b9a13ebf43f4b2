//! Trait abstractions for runtime I/O
//!
//! The turn executor and tool handlers only see these seams, so storage
//! and metrics can be swapped for mocks in tests.

use crate::db::{AgentRecord, Database, DbError, SessionKey, SessionRecord, StateDelta, UsageSnapshot};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-session state records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Most recently updated record for the session
    async fn get_session(&self, key: &SessionKey) -> Result<Option<SessionRecord>, String>;

    /// Insert a fresh record for a just-created session
    async fn create_session(&self, key: &SessionKey) -> Result<SessionRecord, String>;

    /// Merge (or replace) a delta into the authoritative record
    async fn merge_write(&self, key: &SessionKey, delta: &StateDelta)
        -> Result<SessionRecord, String>;

    /// Collapse duplicate records to the most recently updated one
    async fn reconcile(&self, key: &SessionKey) -> Result<usize, String>;
}

/// Lookup of owning agent records
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, String>;
}

/// Sink for per-agent usage counters
#[async_trait]
pub trait UsageMetrics: Send + Sync {
    async fn record_turn(&self, agent_id: &str, success: bool) -> Result<UsageSnapshot, String>;
}

/// Combined storage trait for convenience
pub trait Storage: SessionStore + AgentDirectory {}
impl<T: SessionStore + AgentDirectory> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get_session(&self, key: &SessionKey) -> Result<Option<SessionRecord>, String> {
        (**self).get_session(key).await
    }

    async fn create_session(&self, key: &SessionKey) -> Result<SessionRecord, String> {
        (**self).create_session(key).await
    }

    async fn merge_write(
        &self,
        key: &SessionKey,
        delta: &StateDelta,
    ) -> Result<SessionRecord, String> {
        (**self).merge_write(key, delta).await
    }

    async fn reconcile(&self, key: &SessionKey) -> Result<usize, String> {
        (**self).reconcile(key).await
    }
}

#[async_trait]
impl<T: AgentDirectory + ?Sized> AgentDirectory for Arc<T> {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, String> {
        (**self).get_agent(agent_id).await
    }
}

#[async_trait]
impl<T: UsageMetrics + ?Sized> UsageMetrics for Arc<T> {
    async fn record_turn(&self, agent_id: &str, success: bool) -> Result<UsageSnapshot, String> {
        (**self).record_turn(agent_id, success).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as Storage and metrics sink
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn get_session(&self, key: &SessionKey) -> Result<Option<SessionRecord>, String> {
        self.db.get_session(key).map_err(|e| e.to_string())
    }

    async fn create_session(&self, key: &SessionKey) -> Result<SessionRecord, String> {
        self.db.create_session(key).map_err(|e| e.to_string())
    }

    async fn merge_write(
        &self,
        key: &SessionKey,
        delta: &StateDelta,
    ) -> Result<SessionRecord, String> {
        self.db.merge_write(key, delta).map_err(|e| e.to_string())
    }

    async fn reconcile(&self, key: &SessionKey) -> Result<usize, String> {
        self.db.reconcile(key).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl AgentDirectory for DatabaseStorage {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, String> {
        match self.db.get_agent(agent_id) {
            Ok(agent) => Ok(Some(agent)),
            Err(DbError::AgentNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl UsageMetrics for DatabaseStorage {
    async fn record_turn(&self, agent_id: &str, success: bool) -> Result<UsageSnapshot, String> {
        self.db
            .record_agent_turn(agent_id, success)
            .map_err(|e| e.to_string())
    }
}
