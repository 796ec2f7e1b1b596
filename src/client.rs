//! HTTP client for the backend API.
//!
//! The moderation front end talks to the backend through [`ApiClient`]:
//! configuration fetches (behind the [`crate::cache::ConfigCache`]) and
//! violation/ticket reporting. One `reqwest::Client` is reused for
//! connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::cache::ConfigFetcher;
use crate::document::AutomodConfig;
use crate::event::ModEvent;
use crate::guard::EventSink;
use crate::API_KEY_HEADER;

/// Default timeout for backend requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures talking to the backend. The cache folds all of these into
/// [`crate::cache::ConfigUnavailable`]; event reporting swallows them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(StatusCode),
}

/// Client for the backend's JSON endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    client: Client,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch a community's configuration document.
    pub async fn get_config(&self, community_id: &str) -> Result<AutomodConfig, ClientError> {
        let url = format!("{}/config/{}", self.base_url, community_id);
        debug!(url = %url, "Fetching config");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        Ok(response.json().await?)
    }

    /// Report a classified event to ingestion.
    pub async fn post_event(&self, event: &ModEvent) -> Result<(), ClientError> {
        let url = format!("{}/event", self.base_url);
        debug!(url = %url, community = %event.community_id, "Reporting event");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .json(&event.to_wire())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        Ok(())
    }
}

#[async_trait]
impl ConfigFetcher for ApiClient {
    async fn fetch_config(&self, community_id: &str) -> Result<AutomodConfig, ClientError> {
        self.get_config(community_id).await
    }
}

#[async_trait]
impl EventSink for ApiClient {
    async fn report(&self, event: &ModEvent) -> Result<(), ClientError> {
        self.post_event(event).await
    }
}
