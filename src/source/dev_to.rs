//! Dev.to top articles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::http::{endpoint, HttpClient};
use super::{decode_entry, SourceFetcher};
use crate::article::NewArticle;
use crate::Result;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://dev.to/api";

/// Default page size.
pub const DEFAULT_LIMIT: usize = 30;

/// Window, in days, for Dev.to's "top" ranking.
const TOP_DAYS: u32 = 7;

const SOURCE_TYPE: &str = "dev_to";

#[derive(Debug, Deserialize)]
struct DevToArticle {
    id: i64,
    title: String,
    url: String,
    published_at: DateTime<Utc>,
    description: Option<String>,
    positive_reactions_count: Option<i64>,
    comments_count: Option<i64>,
}

impl From<DevToArticle> for NewArticle {
    fn from(article: DevToArticle) -> Self {
        NewArticle::new(
            article.id.to_string(),
            SOURCE_TYPE,
            article.title,
            article.url,
            article.published_at,
        )
        .with_description(article.description.unwrap_or_default())
        .with_score(article.positive_reactions_count.unwrap_or(0))
        .with_comment_count(article.comments_count.unwrap_or(0))
    }
}

/// Fetches the week's top Dev.to articles.
pub struct DevToFetcher {
    http: HttpClient,
    base_url: String,
    limit: usize,
}

impl DevToFetcher {
    /// Create a fetcher against the public API.
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            limit: DEFAULT_LIMIT,
        }
    }

    /// Use a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request `limit` articles per page.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl SourceFetcher for DevToFetcher {
    fn name(&self) -> &str {
        SOURCE_TYPE
    }

    async fn fetch(&self) -> Result<Vec<NewArticle>> {
        info!("Fetching articles from Dev.to...");

        let mut url = endpoint(&self.base_url, "articles")?;
        url.query_pairs_mut()
            .append_pair("per_page", &self.limit.to_string())
            .append_pair("top", &TOP_DAYS.to_string());

        let entries = match self.http.get_json(url).await? {
            Some(Value::Array(entries)) => entries,
            _ => {
                warn!("{}: articles payload is not an array", SOURCE_TYPE);
                return Ok(Vec::new());
            }
        };

        let articles: Vec<NewArticle> = entries
            .into_iter()
            .filter_map(|entry| decode_entry::<DevToArticle>(SOURCE_TYPE, entry))
            .map(NewArticle::from)
            .collect();

        info!("Fetched {} articles from Dev.to", articles.len());
        Ok(articles)
    }
}
