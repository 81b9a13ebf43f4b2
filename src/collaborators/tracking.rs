//! Document tracking: hand-off of generated documents for fulfilment

use super::{check_status, http_client};
use crate::db::{Database, TrackedDocument};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest {
    pub agent_id: String,
    pub content: String,
    pub document_type: String,
    pub contact_name: String,
    pub contact_address: String,
    pub sla_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingReceipt {
    pub tracking_id: String,
    pub price: i64,
    pub sla_deadline: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentTracker: Send + Sync {
    async fn track(&self, request: &TrackingRequest) -> Result<TrackingReceipt, String>;
}

#[async_trait]
impl<T: DocumentTracker + ?Sized> DocumentTracker for Arc<T> {
    async fn track(&self, request: &TrackingRequest) -> Result<TrackingReceipt, String> {
        (**self).track(request).await
    }
}

/// Tracking service reached over HTTP
pub struct HttpDocumentTracker {
    client: reqwest::Client,
    url: String,
}

impl HttpDocumentTracker {
    pub fn new(url: impl Into<String>) -> Result<Self, String> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DocumentTracker for HttpDocumentTracker {
    async fn track(&self, request: &TrackingRequest) -> Result<TrackingReceipt, String> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| format!("Tracking request failed: {e}"))?;

        check_status(response)
            .await?
            .json::<TrackingReceipt>()
            .await
            .map_err(|e| format!("Invalid tracking response: {e}"))
    }
}

/// Local tracker that records documents in the database ledger
///
/// Prices come from the owning agent record.
#[derive(Clone)]
pub struct LedgerTracker {
    db: Database,
}

impl LedgerTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentTracker for LedgerTracker {
    async fn track(&self, request: &TrackingRequest) -> Result<TrackingReceipt, String> {
        let agent = self
            .db
            .get_agent(&request.agent_id)
            .map_err(|e| e.to_string())?;

        let now = Utc::now();
        let document = TrackedDocument {
            tracking_id: uuid::Uuid::new_v4().to_string(),
            document_type: request.document_type.clone(),
            content: request.content.clone(),
            contact_name: request.contact_name.clone(),
            contact_address: request.contact_address.clone(),
            price: agent.price,
            sla_deadline: now + Duration::hours(i64::from(request.sla_hours)),
            created_at: now,
        };
        self.db
            .insert_document(&document)
            .map_err(|e| e.to_string())?;

        tracing::info!(
            tracking_id = %document.tracking_id,
            document_type = %document.document_type,
            "Document recorded in ledger"
        );

        Ok(TrackingReceipt {
            tracking_id: document.tracking_id,
            price: document.price,
            sla_deadline: document.sla_deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentTemplate, NewAgent};

    #[tokio::test]
    async fn test_ledger_records_document_with_agent_price() {
        let db = Database::open_in_memory().unwrap();
        db.create_agent(&NewAgent {
            id: Some("agent-1".to_string()),
            name: "Tutela".to_string(),
            assistant_id: "asst_1".to_string(),
            document_type: "tutela".to_string(),
            template: DocumentTemplate {
                body: String::new(),
                fields: vec![],
            },
            price: 80_000,
            sla_hours: None,
        })
        .unwrap();

        let tracker = LedgerTracker::new(db.clone());
        let before = Utc::now();
        let receipt = tracker
            .track(&TrackingRequest {
                agent_id: "agent-1".to_string(),
                content: "Documento".to_string(),
                document_type: "tutela".to_string(),
                contact_name: "Ana".to_string(),
                contact_address: "ana@example.com".to_string(),
                sla_hours: 24,
            })
            .await
            .unwrap();

        assert_eq!(receipt.price, 80_000);
        assert!(receipt.sla_deadline >= before + Duration::hours(24));

        let stored = db.get_document(&receipt.tracking_id).unwrap().unwrap();
        assert_eq!(stored.contact_address, "ana@example.com");
    }

    #[tokio::test]
    async fn test_ledger_unknown_agent_is_error() {
        let tracker = LedgerTracker::new(Database::open_in_memory().unwrap());
        let result = tracker
            .track(&TrackingRequest {
                agent_id: "missing".to_string(),
                content: String::new(),
                document_type: "x".to_string(),
                contact_name: "Ana".to_string(),
                contact_address: "ana@example.com".to_string(),
                sla_hours: 24,
            })
            .await;
        assert!(result.is_err());
    }
}
