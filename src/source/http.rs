//! Shared HTTP client for news sources.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::config::IngestConfig;
use crate::{DevNewsError, Result};

/// Maximum accepted response body size (5MB).
pub const MAX_RESPONSE_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// JSON-over-HTTP client used by every fetcher.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client from the ingestion settings.
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| DevNewsError::Source(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// GET a URL and decode the body as JSON.
    ///
    /// Transport failures and non-2xx statuses are errors. A body that is not
    /// valid JSON yields `Ok(None)`.
    pub async fn get_json(&self, url: Url) -> Result<Option<Value>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DevNewsError::Source(format!("failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(DevNewsError::Source(format!(
                "HTTP error from {}: {}",
                url,
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_RESPONSE_SIZE {
                return Err(DevNewsError::Source(format!(
                    "response too large: {} bytes (max {} bytes)",
                    content_length, MAX_RESPONSE_SIZE
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DevNewsError::Source(format!("failed to read response: {}", e)))?;

        if bytes.len() as u64 > MAX_RESPONSE_SIZE {
            return Err(DevNewsError::Source(format!(
                "response too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_RESPONSE_SIZE
            )));
        }

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring non-JSON response from {}: {}", url, e);
                Ok(None)
            }
        }
    }
}

/// Join a path onto a base URL, keeping any path prefix of the base.
pub fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| DevNewsError::Config(format!("invalid URL {}: {}", joined, e)))
}
