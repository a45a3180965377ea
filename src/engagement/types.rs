//! Engagement types for devnews.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A bookmark attached to an article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bookmark {
    /// Bookmark ID.
    pub id: i64,
    /// Article this bookmark belongs to.
    pub article_id: i64,
    /// When the article was bookmarked.
    pub bookmarked_at: DateTime<Utc>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// New bookmark for creation.
#[derive(Debug, Clone)]
pub struct NewBookmark {
    /// Article ID.
    pub article_id: i64,
    /// Bookmark timestamp.
    pub bookmarked_at: DateTime<Utc>,
}

impl NewBookmark {
    /// Create a bookmark stamped with the current time.
    pub fn new(article_id: i64) -> Self {
        Self {
            article_id,
            bookmarked_at: Utc::now(),
        }
    }

    /// Use a caller-supplied timestamp.
    pub fn with_bookmarked_at(mut self, bookmarked_at: DateTime<Utc>) -> Self {
        self.bookmarked_at = bookmarked_at;
        self
    }
}

/// A read mark attached to an article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadMark {
    /// Read mark ID.
    pub id: i64,
    /// Article this mark belongs to.
    pub article_id: i64,
    /// When the article was read.
    pub read_at: DateTime<Utc>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// New read mark for creation.
#[derive(Debug, Clone)]
pub struct NewReadMark {
    /// Article ID.
    pub article_id: i64,
    /// Read timestamp.
    pub read_at: DateTime<Utc>,
}

impl NewReadMark {
    /// Create a read mark stamped with the current time.
    pub fn new(article_id: i64) -> Self {
        Self {
            article_id,
            read_at: Utc::now(),
        }
    }

    /// Use a caller-supplied timestamp.
    pub fn with_read_at(mut self, read_at: DateTime<Utc>) -> Self {
        self.read_at = read_at;
        self
    }
}

/// A dismissal attached to an article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dismissal {
    /// Dismissal ID.
    pub id: i64,
    /// Article this dismissal belongs to.
    pub article_id: i64,
    /// When the article was dismissed.
    pub dismissed_at: DateTime<Utc>,
    /// Whether the dismissal has been made permanent.
    pub permanent: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

impl Dismissal {
    /// Sub-state of this dismissal.
    pub fn state(&self) -> DismissalState {
        if self.permanent {
            DismissalState::Permanent
        } else {
            DismissalState::Pending
        }
    }
}

/// New dismissal for creation.
#[derive(Debug, Clone)]
pub struct NewDismissal {
    /// Article ID.
    pub article_id: i64,
    /// Dismissal timestamp.
    pub dismissed_at: DateTime<Utc>,
}

impl NewDismissal {
    /// Create a pending dismissal stamped with the current time.
    pub fn new(article_id: i64) -> Self {
        Self {
            article_id,
            dismissed_at: Utc::now(),
        }
    }

    /// Use a caller-supplied timestamp.
    pub fn with_dismissed_at(mut self, dismissed_at: DateTime<Utc>) -> Self {
        self.dismissed_at = dismissed_at;
        self
    }
}

/// Dismissal lifecycle state of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissalState {
    /// No dismissal row.
    #[default]
    Active,
    /// Dismissed, still undoable before promotion.
    Pending,
    /// Promoted to permanent.
    Permanent,
}

impl DismissalState {
    /// Derive the state from an optional dismissal row.
    pub fn of(dismissal: Option<&Dismissal>) -> Self {
        dismissal.map(Dismissal::state).unwrap_or_default()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DismissalState::Active => "active",
            DismissalState::Pending => "pending",
            DismissalState::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for DismissalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engagement flags of one article, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngagementState {
    /// Article ID.
    pub article_id: i64,
    /// Whether a bookmark exists.
    pub bookmarked: bool,
    /// Whether a read mark exists.
    pub read: bool,
    /// Dismissal sub-state.
    pub dismissal: DismissalState,
}

impl EngagementState {
    /// Whether the article is permanently dismissed.
    pub fn dismissed(&self) -> bool {
        self.dismissal == DismissalState::Permanent
    }
}

/// Result of one promotion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// The dismissal was pending and is now permanent.
    Promoted,
    /// The dismissal was already permanent; nothing was written.
    AlreadyPermanent,
    /// The dismissal no longer exists (undone before the promotion fired).
    Missing,
}
