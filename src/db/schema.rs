//! Database schema and types

use crate::assistant::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SQL schema for initialization
///
/// `session_states` deliberately has no UNIQUE constraint on
/// `(thread_id, agent_id)`: duplicate rows from racing writers must be
/// representable so `reconcile` can collapse them.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    assistant_id TEXT NOT NULL,
    document_type TEXT NOT NULL,
    template TEXT NOT NULL,
    fields TEXT NOT NULL DEFAULT '[]',
    price INTEGER NOT NULL DEFAULT 0,
    sla_hours INTEGER,
    usage_count INTEGER NOT NULL DEFAULT 0,
    success_rate REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    last_message TEXT,
    run_status TEXT,
    run_id TEXT,
    collected_data TEXT NOT NULL DEFAULT '{}',
    placeholder_mapping TEXT NOT NULL DEFAULT '{}',
    user_contact TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Not UNIQUE: merge_write upserts onto the newest row for the key
CREATE INDEX IF NOT EXISTS idx_session_states_key
    ON session_states(thread_id, agent_id, updated_at DESC);

CREATE TABLE IF NOT EXISTS documents (
    tracking_id TEXT PRIMARY KEY,
    document_type TEXT NOT NULL,
    content TEXT NOT NULL,
    contact_name TEXT NOT NULL,
    contact_address TEXT NOT NULL,
    price INTEGER NOT NULL,
    sla_deadline TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Composite identity of a session: external thread plus owning agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub thread_id: String,
    pub agent_id: String,
}

impl SessionKey {
    pub fn new(thread_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            agent_id: agent_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Active,
        }
    }
}

/// Contact identity attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContact {
    pub name: String,
    pub email: String,
    pub authenticated: bool,
}

/// The authoritative state row of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub row_id: i64,
    #[serde(flatten)]
    pub key: SessionKey,
    pub status: SessionStatus,
    pub last_message: Option<String>,
    pub run_status: Option<RunStatus>,
    pub run_id: Option<String>,
    pub collected_data: BTreeMap<String, String>,
    pub placeholder_mapping: BTreeMap<String, String>,
    pub user_contact: Option<UserContact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_authenticated(&self) -> bool {
        self.user_contact.as_ref().is_some_and(|c| c.authenticated)
    }

    /// Apply a write delta in place
    ///
    /// `collected_data` and `placeholder_mapping` are shallow-merged when
    /// `delta.merge` is set and replaced otherwise. Every other field is
    /// replaced wholesale when the delta supplies it.
    pub fn apply(&mut self, delta: &StateDelta) {
        if delta.merge {
            self.collected_data.extend(
                delta
                    .collected_data
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            self.placeholder_mapping.extend(
                delta
                    .placeholder_mapping
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        } else {
            self.collected_data.clone_from(&delta.collected_data);
            self.placeholder_mapping
                .clone_from(&delta.placeholder_mapping);
        }

        if let Some(status) = delta.status {
            self.status = status;
        }
        if let Some(message) = &delta.last_message {
            self.last_message = Some(message.clone());
        }
        if let Some(run_status) = delta.run_status {
            self.run_status = Some(run_status);
        }
        if let Some(run_id) = &delta.run_id {
            self.run_id = Some(run_id.clone());
        }
        if let Some(contact) = &delta.user_contact {
            self.user_contact = Some(contact.clone());
        }
    }
}

/// Changes to write into a session's state record
#[derive(Debug, Clone, PartialEq)]
pub struct StateDelta {
    pub collected_data: BTreeMap<String, String>,
    pub placeholder_mapping: BTreeMap<String, String>,
    /// Shallow-merge the maps (true) or replace them (false)
    pub merge: bool,
    pub status: Option<SessionStatus>,
    pub last_message: Option<String>,
    pub run_status: Option<RunStatus>,
    pub run_id: Option<String>,
    pub user_contact: Option<UserContact>,
}

impl Default for StateDelta {
    fn default() -> Self {
        Self {
            collected_data: BTreeMap::new(),
            placeholder_mapping: BTreeMap::new(),
            merge: true,
            status: None,
            last_message: None,
            run_status: None,
            run_id: None,
            user_contact: None,
        }
    }
}

impl StateDelta {
    /// Data written by a tool handler
    pub fn data(
        collected_data: BTreeMap<String, String>,
        placeholder_mapping: BTreeMap<String, String>,
        merge: bool,
    ) -> Self {
        Self {
            collected_data,
            placeholder_mapping,
            merge,
            ..Self::default()
        }
    }

    pub fn contact(contact: UserContact) -> Self {
        Self {
            user_contact: Some(contact),
            ..Self::default()
        }
    }
}

/// Declares what a template placeholder means and how to ask for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Token as it appears between `{{` and `}}`
    pub placeholder: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Template text plus ordered field metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTemplate {
    pub body: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

/// The owning agent: assistant binding, template and usage counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub assistant_id: String,
    pub document_type: String,
    pub template: DocumentTemplate,
    /// Price of the generated document in whole pesos
    pub price: i64,
    pub sla_hours: Option<u32>,
    pub usage_count: i64,
    /// Percentage of successful turns, 0..=100
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering an agent
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub assistant_id: String,
    pub document_type: String,
    pub template: DocumentTemplate,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub sla_hours: Option<u32>,
}

/// Usage counters after recording a turn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSnapshot {
    pub usage_count: i64,
    pub success_rate: f64,
}

/// Weighted running average of the success percentage
///
/// Rounded half away from zero to two decimals.
pub fn next_success_rate(rate: f64, count: i64, success: bool) -> f64 {
    #[allow(clippy::cast_precision_loss)] // counts stay far below 2^52
    let count = count.max(0) as f64;
    let sample = if success { 100.0 } else { 0.0 };
    let raw = (rate * count + sample) / (count + 1.0);
    (raw * 100.0).round() / 100.0
}

/// A generated document registered in the local tracking ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDocument {
    pub tracking_id: String,
    pub document_type: String,
    pub content: String,
    pub contact_name: String,
    pub contact_address: String,
    pub price: i64,
    pub sla_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord {
            row_id: 1,
            key: SessionKey::new("t", "a"),
            status: SessionStatus::Active,
            last_message: Some("hola".to_string()),
            run_status: None,
            run_id: None,
            collected_data: BTreeMap::new(),
            placeholder_mapping: BTreeMap::new(),
            user_contact: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_apply_merge_keeps_unsupplied_scalars() {
        let mut rec = record();
        rec.apply(&StateDelta::data(map(&[("a", "1")]), BTreeMap::new(), true));
        assert_eq!(rec.last_message.as_deref(), Some("hola"));
        assert_eq!(rec.collected_data, map(&[("a", "1")]));
    }

    #[test]
    fn test_apply_replace_drops_both_maps() {
        let mut rec = record();
        rec.collected_data = map(&[("a", "1"), ("b", "2")]);
        rec.placeholder_mapping = map(&[("A", "1")]);
        rec.apply(&StateDelta::data(map(&[("c", "3")]), BTreeMap::new(), false));
        assert_eq!(rec.collected_data, map(&[("c", "3")]));
        assert!(rec.placeholder_mapping.is_empty());
    }

    #[test]
    fn test_success_rate_rounding() {
        assert!((next_success_rate(0.0, 0, true) - 100.0).abs() < f64::EPSILON);
        // (100 * 2 + 0) / 3 = 66.666… → 66.67
        assert!((next_success_rate(100.0, 2, false) - 66.67).abs() < 1e-9);
        // (66.67 * 3 + 100) / 4 = 75.0025 → 75.0
        assert!((next_success_rate(66.67, 3, true) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_field_required_defaults_true() {
        let field: FieldDescriptor =
            serde_json::from_str(r#"{"name": "NOMBRE", "placeholder": "NOMBRE"}"#).unwrap();
        assert!(field.required);
        assert!(field.prompt.is_empty());
    }
}
