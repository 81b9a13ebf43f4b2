//! Database module
//!
//! Provides persistence for agents, per-session state records and the
//! local document ledger.

mod schema;

#[cfg(test)]
mod proptests;

pub use schema::*;

use crate::assistant::RunStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Agent not found: {0}")]
    AgentNotFound(String),
    #[error("Agent already exists: {0}")]
    AgentExists(String),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

const SESSION_COLUMNS: &str = "id, thread_id, agent_id, status, last_message, run_status, run_id,
     collected_data, placeholder_mapping, user_contact, created_at, updated_at";

const AGENT_COLUMNS: &str = "id, name, assistant_id, document_type, template, fields, price,
     sla_hours, usage_count, success_rate, created_at, updated_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Agent Operations ====================

    /// Register a new agent
    pub fn create_agent(&self, agent: &NewAgent) -> DbResult<AgentRecord> {
        let conn = self.lock()?;
        let now = Utc::now();
        let id = agent
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM agents WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(DbError::AgentExists(id));
        }

        let fields = serde_json::to_string(&agent.template.fields)?;
        conn.execute(
            "INSERT INTO agents (id, name, assistant_id, document_type, template, fields, price, sla_hours, usage_count, success_rate, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9, ?9)",
            params![
                id,
                agent.name,
                agent.assistant_id,
                agent.document_type,
                agent.template.body,
                fields,
                agent.price,
                agent.sla_hours,
                timestamp(&now),
            ],
        )?;

        Ok(AgentRecord {
            id,
            name: agent.name.clone(),
            assistant_id: agent.assistant_id.clone(),
            document_type: agent.document_type.clone(),
            template: agent.template.clone(),
            price: agent.price,
            sla_hours: agent.sla_hours,
            usage_count: 0,
            success_rate: 0.0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get agent by ID
    pub fn get_agent(&self, id: &str) -> DbResult<AgentRecord> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            parse_agent_row,
        )
        .optional()?
        .ok_or_else(|| DbError::AgentNotFound(id.to_string()))
    }

    /// Count a finished turn against the agent's usage counters
    ///
    /// Read and write happen in one transaction so concurrent turns never
    /// lose an increment.
    pub fn record_agent_turn(&self, id: &str, success: bool) -> DbResult<UsageSnapshot> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let (count, rate): (i64, f64) = tx
            .query_row(
                "SELECT usage_count, success_rate FROM agents WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::AgentNotFound(id.to_string()))?;

        let snapshot = UsageSnapshot {
            usage_count: count + 1,
            success_rate: next_success_rate(rate, count, success),
        };

        tx.execute(
            "UPDATE agents SET usage_count = ?1, success_rate = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                snapshot.usage_count,
                snapshot.success_rate,
                timestamp(&Utc::now()),
                id
            ],
        )?;
        tx.commit()?;

        Ok(snapshot)
    }

    // ==================== Session State Operations ====================

    /// Insert a fresh state row for a session
    ///
    /// Plain insert: called when a thread has just been created, which is
    /// the window in which racing writers can produce duplicates.
    pub fn create_session(&self, key: &SessionKey) -> DbResult<SessionRecord> {
        self.insert_session_at(key, Utc::now())
    }

    pub(crate) fn insert_session_at(
        &self,
        key: &SessionKey,
        at: DateTime<Utc>,
    ) -> DbResult<SessionRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO session_states (thread_id, agent_id, status, collected_data, placeholder_mapping, created_at, updated_at)
             VALUES (?1, ?2, 'active', '{}', '{}', ?3, ?3)",
            params![key.thread_id, key.agent_id, timestamp(&at)],
        )?;

        Ok(SessionRecord {
            row_id: conn.last_insert_rowid(),
            key: key.clone(),
            status: SessionStatus::Active,
            last_message: None,
            run_status: None,
            run_id: None,
            collected_data: BTreeMap::new(),
            placeholder_mapping: BTreeMap::new(),
            user_contact: None,
            created_at: at,
            updated_at: at,
        })
    }

    /// Most recently updated state row for the session
    pub fn get_session(&self, key: &SessionKey) -> DbResult<Option<SessionRecord>> {
        let conn = self.lock()?;
        latest_session(&conn, key)
    }

    /// Every state row for the session, newest first
    #[cfg(test)]
    pub fn list_session_rows(&self, key: &SessionKey) -> DbResult<Vec<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_states
             WHERE thread_id = ?1 AND agent_id = ?2
             ORDER BY updated_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![key.thread_id, key.agent_id], parse_session_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Upsert a delta onto the session's authoritative row
    ///
    /// Updates the most recent row in place, or inserts one if the session
    /// has no row yet, inside a single transaction. The composite
    /// `(thread_id, agent_id)` index is not UNIQUE: this upsert, serialized
    /// by the connection mutex, is what keeps one authoritative row per
    /// session, and `reconcile` removes any duplicate a racing
    /// `create_session` left behind.
    pub fn merge_write(&self, key: &SessionKey, delta: &StateDelta) -> DbResult<SessionRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let record = if let Some(mut record) = latest_session(&tx, key)? {
            record.apply(delta);
            record.updated_at = now;
            update_session_row(&tx, &record)?;
            record
        } else {
            tx.execute(
                "INSERT INTO session_states (thread_id, agent_id, status, collected_data, placeholder_mapping, created_at, updated_at)
                 VALUES (?1, ?2, 'active', '{}', '{}', ?3, ?3)",
                params![key.thread_id, key.agent_id, timestamp(&now)],
            )?;
            let mut record = SessionRecord {
                row_id: tx.last_insert_rowid(),
                key: key.clone(),
                status: SessionStatus::Active,
                last_message: None,
                run_status: None,
                run_id: None,
                collected_data: BTreeMap::new(),
                placeholder_mapping: BTreeMap::new(),
                user_contact: None,
                created_at: now,
                updated_at: now,
            };
            record.apply(delta);
            update_session_row(&tx, &record)?;
            record
        };

        tx.commit()?;
        Ok(record)
    }

    /// Delete every state row for the session except the most recently updated
    ///
    /// Returns the number of rows removed.
    pub fn reconcile(&self, key: &SessionKey) -> DbResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let keep: Option<i64> = tx
            .query_row(
                "SELECT id FROM session_states
                 WHERE thread_id = ?1 AND agent_id = ?2
                 ORDER BY updated_at DESC, id DESC LIMIT 1",
                params![key.thread_id, key.agent_id],
                |row| row.get(0),
            )
            .optional()?;

        let removed = match keep {
            Some(keep) => tx.execute(
                "DELETE FROM session_states WHERE thread_id = ?1 AND agent_id = ?2 AND id != ?3",
                params![key.thread_id, key.agent_id, keep],
            )?,
            None => 0,
        };

        tx.commit()?;

        if removed > 0 {
            tracing::info!(
                thread_id = %key.thread_id,
                agent_id = %key.agent_id,
                removed,
                "Reconciled duplicate session state rows"
            );
        }
        Ok(removed)
    }

    // ==================== Document Ledger ====================

    /// Record a generated document in the local ledger
    pub fn insert_document(&self, document: &TrackedDocument) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (tracking_id, document_type, content, contact_name, contact_address, price, sla_deadline, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                document.tracking_id,
                document.document_type,
                document.content,
                document.contact_name,
                document.contact_address,
                document.price,
                timestamp(&document.sla_deadline),
                timestamp(&document.created_at),
            ],
        )?;
        Ok(())
    }

    /// Look up a ledger entry by tracking id
    #[cfg(test)]
    pub fn get_document(&self, tracking_id: &str) -> DbResult<Option<TrackedDocument>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT tracking_id, document_type, content, contact_name, contact_address, price, sla_deadline, created_at
             FROM documents WHERE tracking_id = ?1",
            params![tracking_id],
            |row| {
                Ok(TrackedDocument {
                    tracking_id: row.get(0)?,
                    document_type: row.get(1)?,
                    content: row.get(2)?,
                    contact_name: row.get(3)?,
                    contact_address: row.get(4)?,
                    price: row.get(5)?,
                    sla_deadline: parse_datetime(&row.get::<_, String>(6)?),
                    created_at: parse_datetime(&row.get::<_, String>(7)?),
                })
            },
        )
        .optional()
        .map_err(DbError::from)
    }
}

fn latest_session(conn: &Connection, key: &SessionKey) -> DbResult<Option<SessionRecord>> {
    conn.query_row(
        &format!(
            "SELECT {SESSION_COLUMNS} FROM session_states
             WHERE thread_id = ?1 AND agent_id = ?2
             ORDER BY updated_at DESC, id DESC LIMIT 1"
        ),
        params![key.thread_id, key.agent_id],
        parse_session_row,
    )
    .optional()
    .map_err(DbError::from)
}

fn update_session_row(tx: &Transaction<'_>, record: &SessionRecord) -> DbResult<()> {
    let user_contact = record
        .user_contact
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    tx.execute(
        "UPDATE session_states
         SET status = ?1, last_message = ?2, run_status = ?3, run_id = ?4,
             collected_data = ?5, placeholder_mapping = ?6, user_contact = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            record.status.as_str(),
            record.last_message,
            record.run_status.map(RunStatus::as_str),
            record.run_id,
            serde_json::to_string(&record.collected_data)?,
            serde_json::to_string(&record.placeholder_mapping)?,
            user_contact,
            timestamp(&record.updated_at),
            record.row_id,
        ],
    )?;
    Ok(())
}

/// Parse a session state row
fn parse_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let collected: String = row.get(7)?;
    let mapping: String = row.get(8)?;
    let contact: Option<String> = row.get(9)?;

    Ok(SessionRecord {
        row_id: row.get(0)?,
        key: SessionKey {
            thread_id: row.get(1)?,
            agent_id: row.get(2)?,
        },
        status: SessionStatus::parse(&row.get::<_, String>(3)?),
        last_message: row.get(4)?,
        run_status: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| RunStatus::parse(&s)),
        run_id: row.get(6)?,
        collected_data: serde_json::from_str(&collected).unwrap_or_default(),
        placeholder_mapping: serde_json::from_str(&mapping).unwrap_or_default(),
        user_contact: contact.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

/// Parse an agent row
fn parse_agent_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
    let fields: String = row.get(5)?;
    Ok(AgentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        assistant_id: row.get(2)?,
        document_type: row.get(3)?,
        template: DocumentTemplate {
            body: row.get(4)?,
            fields: serde_json::from_str(&fields).unwrap_or_default(),
        },
        price: row.get(6)?,
        sla_hours: row.get(7)?,
        usage_count: row.get(8)?,
        success_rate: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

/// Fixed-width RFC 3339 so lexical order matches time order
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
