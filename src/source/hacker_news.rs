//! Hacker News top stories.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::http::{endpoint, HttpClient};
use super::{decode_entry, SourceFetcher};
use crate::article::NewArticle;
use crate::Result;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

/// Default number of top stories to fetch.
pub const DEFAULT_LIMIT: usize = 30;

/// Item requests in flight at once.
const ITEM_CONCURRENCY: usize = 8;

const SOURCE_TYPE: &str = "hacker_news";

#[derive(Debug, Deserialize)]
struct Item {
    id: i64,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    url: Option<String>,
    time: Option<i64>,
    text: Option<String>,
    score: Option<i64>,
    descendants: Option<i64>,
}

/// Fetches the current Hacker News top stories.
pub struct HackerNewsFetcher {
    http: HttpClient,
    base_url: String,
    limit: usize,
}

impl HackerNewsFetcher {
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

    /// Fetch at most `limit` stories.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    async fn fetch_story(&self, id: i64) -> Option<NewArticle> {
        let url = match endpoint(&self.base_url, &format!("item/{}.json", id)) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}: {}", SOURCE_TYPE, e);
                return None;
            }
        };

        let value = match self.http.get_json(url).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("{}: failed to fetch story {}: {}", SOURCE_TYPE, id, e);
                return None;
            }
        };
        // Deleted items come back as null.
        if value.is_null() {
            return None;
        }

        let item: Item = decode_entry(SOURCE_TYPE, value)?;
        normalize(item)
    }
}

/// Turn an item into a record, dropping non-stories and link-less posts.
fn normalize(item: Item) -> Option<NewArticle> {
    if item.kind.as_deref() != Some("story") {
        return None;
    }
    let url = item.url?;
    let title = match item.title {
        Some(title) => title,
        None => {
            warn!("{}: story {} has no title", SOURCE_TYPE, item.id);
            return None;
        }
    };
    let published_at = match item.time.and_then(|t| Utc.timestamp_opt(t, 0).single()) {
        Some(ts) => ts,
        None => {
            warn!("{}: story {} has no valid time", SOURCE_TYPE, item.id);
            return None;
        }
    };

    Some(
        NewArticle::new(item.id.to_string(), SOURCE_TYPE, title, url, published_at)
            .with_description(item.text.unwrap_or_default())
            .with_score(item.score.unwrap_or(0))
            .with_comment_count(item.descendants.unwrap_or(0)),
    )
}

#[async_trait]
impl SourceFetcher for HackerNewsFetcher {
    fn name(&self) -> &str {
        SOURCE_TYPE
    }

    async fn fetch(&self) -> Result<Vec<NewArticle>> {
        info!("Fetching articles from Hacker News...");

        let url = endpoint(&self.base_url, "topstories.json")?;
        let ids: Vec<i64> = match self.http.get_json(url).await? {
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(Value::as_i64)
                .take(self.limit)
                .collect(),
            _ => {
                warn!("{}: top stories payload is not an array", SOURCE_TYPE);
                return Ok(Vec::new());
            }
        };

        let articles: Vec<NewArticle> = stream::iter(ids)
            .map(|id| self.fetch_story(id))
            .buffered(ITEM_CONCURRENCY)
            .filter_map(|article| async { article })
            .collect()
            .await;

        info!("Fetched {} articles from Hacker News", articles.len());
        Ok(articles)
    }
}
