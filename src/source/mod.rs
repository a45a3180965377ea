//! News source module for devnews.
//!
//! Every provider implements [`SourceFetcher`]: it calls its API, drops
//! entries it cannot use and turns the rest into [`NewArticle`] records.
//! Fetchers never touch storage.

mod dev_to;
mod hacker_news;
pub mod http;
mod reddit;

pub use dev_to::DevToFetcher;
pub use hacker_news::HackerNewsFetcher;
pub use http::HttpClient;
pub use reddit::RedditFetcher;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::article::NewArticle;
use crate::config::{IngestConfig, SourceConfig, SourceKind};
use crate::{DevNewsError, Result};

/// A news provider.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Fetch the provider's current page of articles.
    ///
    /// Malformed or unusable entries are skipped. An error means the
    /// provider as a whole could not be reached.
    async fn fetch(&self) -> Result<Vec<NewArticle>>;
}

/// Build fetchers for the configured sources, sharing one HTTP client.
pub fn build_fetchers(
    ingest: &IngestConfig,
    sources: &[SourceConfig],
) -> Result<Vec<Box<dyn SourceFetcher>>> {
    let http = HttpClient::new(ingest)?;
    sources
        .iter()
        .map(|source| build_fetcher(http.clone(), source))
        .collect()
}

/// Build the fetcher for one configured source.
pub fn build_fetcher(http: HttpClient, source: &SourceConfig) -> Result<Box<dyn SourceFetcher>> {
    let fetcher: Box<dyn SourceFetcher> = match source.kind {
        SourceKind::HackerNews => {
            let mut fetcher = HackerNewsFetcher::new(http);
            if let Some(ref base_url) = source.base_url {
                fetcher = fetcher.with_base_url(base_url);
            }
            if let Some(limit) = source.limit {
                fetcher = fetcher.with_limit(limit);
            }
            Box::new(fetcher)
        }
        SourceKind::DevTo => {
            let mut fetcher = DevToFetcher::new(http);
            if let Some(ref base_url) = source.base_url {
                fetcher = fetcher.with_base_url(base_url);
            }
            if let Some(limit) = source.limit {
                fetcher = fetcher.with_limit(limit);
            }
            Box::new(fetcher)
        }
        SourceKind::Reddit => {
            let subreddit = source
                .subreddit
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    DevNewsError::Config("reddit source requires a subreddit".to_string())
                })?;
            let mut fetcher = RedditFetcher::new(http, subreddit);
            if let Some(ref base_url) = source.base_url {
                fetcher = fetcher.with_base_url(base_url);
            }
            if let Some(limit) = source.limit {
                fetcher = fetcher.with_limit(limit);
            }
            Box::new(fetcher)
        }
    };
    Ok(fetcher)
}

/// Decode one payload entry, logging and discarding it if malformed.
pub(crate) fn decode_entry<T: DeserializeOwned>(source: &str, entry: Value) -> Option<T> {
    match serde_json::from_value(entry) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("{}: skipping malformed entry: {}", source, e);
            None
        }
    }
}
