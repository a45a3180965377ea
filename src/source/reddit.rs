//! Hot posts of a subreddit.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::http::{endpoint, HttpClient};
use super::{decode_entry, SourceFetcher};
use crate::article::NewArticle;
use crate::Result;

/// Default site base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

/// Default number of posts per listing.
pub const DEFAULT_LIMIT: usize = 25;

/// Prefix for links to a post's own page.
const PERMALINK_BASE: &str = "https://reddit.com";

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: String,
    permalink: Option<String>,
    url_overridden_by_dest: Option<String>,
    #[serde(default)]
    is_self: bool,
    created_utc: f64,
    selftext: Option<String>,
    score: Option<i64>,
    num_comments: Option<i64>,
}

/// Fetches the hot listing of one subreddit.
pub struct RedditFetcher {
    http: HttpClient,
    subreddit: String,
    source_type: String,
    base_url: String,
    limit: usize,
}

impl RedditFetcher {
    /// Create a fetcher for a subreddit.
    pub fn new(http: HttpClient, subreddit: impl Into<String>) -> Self {
        let subreddit = subreddit.into();
        Self {
            http,
            source_type: format!("reddit_{}", subreddit),
            subreddit,
            base_url: DEFAULT_BASE_URL.to_string(),
            limit: DEFAULT_LIMIT,
        }
    }

    /// Use a different site base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request `limit` posts.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn normalize(&self, post: Post) -> Option<NewArticle> {
        // Self posts are only kept when they point somewhere else.
        if post.is_self && post.url_overridden_by_dest.is_none() {
            return None;
        }
        let url = match (post.url_overridden_by_dest, post.permalink) {
            (Some(url), _) => url,
            (None, Some(permalink)) => format!("{}{}", PERMALINK_BASE, permalink),
            (None, None) => {
                warn!("{}: post {} has no link", self.source_type, post.id);
                return None;
            }
        };
        let published_at = match Utc.timestamp_opt(post.created_utc as i64, 0).single() {
            Some(ts) => ts,
            None => {
                warn!("{}: post {} has an invalid timestamp", self.source_type, post.id);
                return None;
            }
        };

        Some(
            NewArticle::new(post.id, self.source_type.as_str(), post.title, url, published_at)
                .with_description(post.selftext.unwrap_or_default())
                .with_score(post.score.unwrap_or(0))
                .with_comment_count(post.num_comments.unwrap_or(0)),
        )
    }
}

#[async_trait]
impl SourceFetcher for RedditFetcher {
    fn name(&self) -> &str {
        &self.source_type
    }

    async fn fetch(&self) -> Result<Vec<NewArticle>> {
        info!("Fetching articles from Reddit r/{}...", self.subreddit);

        let mut url = endpoint(&self.base_url, &format!("r/{}.json", self.subreddit))?;
        url.query_pairs_mut()
            .append_pair("limit", &self.limit.to_string());

        let children = match self.http.get_json(url).await? {
            Some(mut listing) => match listing.pointer_mut("/data/children").map(Value::take) {
                Some(Value::Array(children)) => children,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        if children.is_empty() {
            warn!("{}: listing has no posts", self.source_type);
            return Ok(Vec::new());
        }

        let articles: Vec<NewArticle> = children
            .into_iter()
            .filter_map(|mut child| match child.get_mut("data").map(Value::take) {
                Some(data) => decode_entry::<Post>(&self.source_type, data),
                None => {
                    warn!("{}: skipping listing entry without data", self.source_type);
                    None
                }
            })
            .filter_map(|post| self.normalize(post))
            .collect();

        info!(
            "Fetched {} articles from Reddit r/{}",
            articles.len(),
            self.subreddit
        );
        Ok(articles)
    }
}
