//! External capabilities used by tool handlers
//!
//! Both are opaque to the core: a legal-source search and a document
//! tracker that takes ownership of a generated document.

mod search;
mod tracking;

#[cfg(test)]
pub use search::OfficialLink;
pub use search::{HttpSearchProvider, SearchHit, SearchProvider, SearchQuery, SearchResults};
pub use tracking::{
    DocumentTracker, HttpDocumentTracker, LedgerTracker, TrackingReceipt, TrackingRequest,
};

use std::sync::Arc;
use std::time::Duration;

const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// The collaborators available to tool handlers
#[derive(Clone)]
pub struct Collaborators {
    /// `None` when no search service is configured
    pub search: Option<Arc<dyn SearchProvider>>,
    pub tracker: Arc<dyn DocumentTracker>,
}

fn http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(COLLABORATOR_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))
}

/// Turn a non-success response into an error string carrying its body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("HTTP {}: {}", status.as_u16(), body.trim()))
}
