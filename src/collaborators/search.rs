//! Legal-source search

use super::{check_status, http_client};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    /// Published by an official body (court, ministry, gazette)
    #[serde(default)]
    pub official: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficialLink {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    #[serde(default)]
    pub results: Vec<SearchHit>,
    /// Curated official sources relevant to the query
    #[serde(default)]
    pub official_links: Vec<OfficialLink>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, String>;
}

#[async_trait]
impl<T: SearchProvider + ?Sized> SearchProvider for Arc<T> {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, String> {
        (**self).search(query).await
    }
}

/// Search service reached over HTTP (`POST {url}` with the query as JSON)
pub struct HttpSearchProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpSearchProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, String> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, String> {
        let response = self
            .client
            .post(&self.url)
            .json(query)
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;

        check_status(response)
            .await?
            .json::<SearchResults>()
            .await
            .map_err(|e| format!("Invalid search response: {e}"))
    }
}
