// Trending service client

use crate::errors::ExecutionError;
use crate::models::{Cadence, Repository};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Source of trending repositories
#[async_trait]
pub trait TrendingSource: Send + Sync {
    async fn fetch(
        &self,
        api_url: &str,
        language: Option<&str>,
        since: Cadence,
    ) -> Result<Vec<Repository>, ExecutionError>;
}

/// HTTP client for the trending service
pub struct TrendingClient {
    client: Client,
}

impl TrendingClient {
    /// Create a new TrendingClient with the specified timeout
    pub fn new(timeout_seconds: u64) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| {
                ExecutionError::ClientInit(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

/// Query parameters for a fetch; `language` is omitted when not set
pub fn query_params(language: Option<&str>, since: Cadence) -> Vec<(&'static str, String)> {
    let mut params = vec![("since", since.as_str().to_string())];
    if let Some(language) = language.filter(|l| !l.is_empty()) {
        params.push(("language", language.to_string()));
    }
    params
}

#[async_trait]
impl TrendingSource for TrendingClient {
    #[instrument(skip(self))]
    async fn fetch(
        &self,
        api_url: &str,
        language: Option<&str>,
        since: Cadence,
    ) -> Result<Vec<Repository>, ExecutionError> {
        let response = self
            .client
            .get(api_url)
            .query(&query_params(language, since))
            .send()
            .await
            .map_err(|e| ExecutionError::FetchFailed(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::FetchFailed(format!(
                "Trending service returned {}: {}",
                status, body
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ExecutionError::FetchFailed(format!("Failed to read body: {}", e)))?;

        let repositories: Vec<Repository> = serde_json::from_slice(&body)
            .map_err(|e| ExecutionError::MalformedResponse(e.to_string()))?;

        debug!(count = repositories.len(), "Fetched trending repositories");
        Ok(repositories)
    }
}
