//! devnews - multi-source developer news aggregator
//!
//! Pulls stories from Hacker News, Dev.to and a set of subreddits into one
//! deduplicated SQLite-backed feed, and tracks bookmarks, read marks and
//! undoable dismissals on top of it.

pub mod article;
pub mod config;
pub mod db;
pub mod engagement;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod service;
pub mod source;

pub use article::{Article, ArticleFilter, ArticleRepository, ArticleScope, NewArticle, UpsertOutcome};
pub use config::{Config, SourceConfig, SourceKind};
pub use db::Database;
pub use engagement::{
    DismissalPromoter, DismissalState, EngagementService, EngagementState, PromotionOutcome,
};
pub use error::{DevNewsError, Result};
pub use ingest::{IngestReport, IngestScheduler, IngestionCoordinator, SourceFailure};
pub use service::{FeedStats, NewsService};
pub use source::{DevToFetcher, HackerNewsFetcher, HttpClient, RedditFetcher, SourceFetcher};
