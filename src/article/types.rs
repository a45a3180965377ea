//! Article types for devnews.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{to_db_timestamp, SQL_FALSE, SQL_TRUE};

/// Maximum length for an article description, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 10000;

/// A canonical, deduplicated article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    /// Store-assigned ID.
    pub id: i64,
    /// Article title.
    pub title: String,
    /// Link to the article.
    pub url: String,
    /// When the source published the article.
    pub published_at: DateTime<Utc>,
    /// Description or body excerpt.
    pub description: Option<String>,
    /// Source-scoped identifier.
    pub external_id: String,
    /// Provider/channel tag (e.g. `hacker_news`, `reddit_rust`).
    pub source_type: String,
    /// Source-reported popularity.
    pub score: i64,
    /// Source-reported comment count.
    pub comment_count: i64,
    /// When the article was first stored.
    pub created_at: DateTime<Utc>,
    /// When the article was last changed by ingestion.
    pub updated_at: DateTime<Utc>,
}

/// A normalized record produced by a source fetcher.
///
/// Carries the article fields plus the dedup key `(external_id, source_type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    /// Article title.
    pub title: String,
    /// Link to the article.
    pub url: String,
    /// When the source published the article.
    pub published_at: DateTime<Utc>,
    /// Description, empty when the source has none.
    pub description: Option<String>,
    /// Source-scoped identifier.
    pub external_id: String,
    /// Provider/channel tag.
    pub source_type: String,
    /// Source-reported popularity.
    pub score: i64,
    /// Source-reported comment count.
    pub comment_count: i64,
}

impl NewArticle {
    /// Create a new record with empty description and zero counters.
    pub fn new(
        external_id: impl Into<String>,
        source_type: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            published_at,
            description: Some(String::new()),
            external_id: external_id.into(),
            source_type: source_type.into(),
            score: 0,
            comment_count: 0,
        }
    }

    /// Set the description, truncated to [`MAX_DESCRIPTION_LENGTH`] characters.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let desc = description.into();
        if desc.chars().count() > MAX_DESCRIPTION_LENGTH {
            self.description = Some(desc.chars().take(MAX_DESCRIPTION_LENGTH).collect());
        } else {
            self.description = Some(desc);
        }
        self
    }

    /// Set the score.
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    /// Set the comment count.
    pub fn with_comment_count(mut self, comment_count: i64) -> Self {
        self.comment_count = comment_count;
        self
    }

    /// Check whether any mutable field differs from the stored article.
    ///
    /// Timestamps are compared at storage precision.
    pub fn differs_from(&self, article: &Article) -> bool {
        self.title != article.title
            || self.url != article.url
            || to_db_timestamp(&self.published_at) != to_db_timestamp(&article.published_at)
            || self.description != article.description
            || self.score != article.score
            || self.comment_count != article.comment_count
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new article was inserted.
    Created,
    /// An existing article had changed fields and was updated.
    Updated,
    /// The stored article already matched; nothing was written.
    Unchanged,
}

impl UpsertOutcome {
    /// Whether the upsert created a new article.
    pub fn was_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created)
    }
}

/// A single composable predicate over articles and their attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleScope {
    /// Active or pending dismissal (excludes permanent only).
    NotDismissed,
    /// Permanently dismissed.
    Dismissed,
    /// Dismissed but not yet permanent.
    PendingDismissal,
    /// Has a read mark.
    Read,
    /// Has no read mark.
    NotRead,
    /// Has a bookmark.
    Bookmarked,
    /// Has no bookmark.
    NotBookmarked,
}

impl ArticleScope {
    /// SQL condition for this scope, relative to the `articles a` alias.
    pub(crate) fn sql_condition(&self) -> String {
        match self {
            ArticleScope::NotDismissed => format!("NOT EXISTS ({})", dismissal_subquery(SQL_TRUE)),
            ArticleScope::Dismissed => format!("EXISTS ({})", dismissal_subquery(SQL_TRUE)),
            ArticleScope::PendingDismissal => format!("EXISTS ({})", dismissal_subquery(SQL_FALSE)),
            ArticleScope::Read => {
                "EXISTS (SELECT 1 FROM read_marks r WHERE r.article_id = a.id)".to_string()
            }
            ArticleScope::NotRead => {
                "NOT EXISTS (SELECT 1 FROM read_marks r WHERE r.article_id = a.id)".to_string()
            }
            ArticleScope::Bookmarked => {
                "EXISTS (SELECT 1 FROM bookmarks b WHERE b.article_id = a.id)".to_string()
            }
            ArticleScope::NotBookmarked => {
                "NOT EXISTS (SELECT 1 FROM bookmarks b WHERE b.article_id = a.id)".to_string()
            }
        }
    }
}

fn dismissal_subquery(permanent: &str) -> String {
    format!(
        "SELECT 1 FROM dismissals d WHERE d.article_id = a.id AND d.permanent = {}",
        permanent
    )
}

/// A conjunction of scopes, optionally restricted to one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    /// Scopes that must all hold.
    pub scopes: Vec<ArticleScope>,
    /// Restrict to one source type.
    pub source_type: Option<String>,
}

impl ArticleFilter {
    /// Create an empty filter matching every article.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scope.
    pub fn with(mut self, scope: ArticleScope) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Exclude permanently dismissed articles.
    pub fn not_dismissed(self) -> Self {
        self.with(ArticleScope::NotDismissed)
    }

    /// Only permanently dismissed articles.
    pub fn dismissed(self) -> Self {
        self.with(ArticleScope::Dismissed)
    }

    /// Only articles with a pending dismissal.
    pub fn pending_dismissal(self) -> Self {
        self.with(ArticleScope::PendingDismissal)
    }

    /// Only read articles.
    pub fn read(self) -> Self {
        self.with(ArticleScope::Read)
    }

    /// Only unread articles.
    pub fn not_read(self) -> Self {
        self.with(ArticleScope::NotRead)
    }

    /// Only bookmarked articles.
    pub fn bookmarked(self) -> Self {
        self.with(ArticleScope::Bookmarked)
    }

    /// Only articles without a bookmark.
    pub fn not_bookmarked(self) -> Self {
        self.with(ArticleScope::NotBookmarked)
    }

    /// Restrict to a single source type.
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    /// Check if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty() && self.source_type.is_none()
    }
}
