//! News service for devnews.
//!
//! This is the surface used by the CLI and any other front end: ingestion,
//! engagement actions, listings and cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::article::{Article, ArticleFilter, ArticleRepository};
use crate::config::Config;
use crate::db::Database;
use crate::engagement::{
    DismissalPromoter, DismissalRepository, EngagementService, EngagementState,
};
use crate::ingest::{IngestReport, IngestionCoordinator};
use crate::{DevNewsError, Result};

/// Default page size for article listings.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Default page size for the recently dismissed listing.
pub const RECENTLY_DISMISSED_LIMIT: usize = 10;

/// How far back the recently dismissed listing looks, in hours.
pub const RECENTLY_DISMISSED_HOURS: i64 = 24;

/// Default retention for permanently dismissed articles, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Aggregate numbers about the stored feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStats {
    /// Total stored articles.
    pub articles: i64,
    /// Permanently dismissed articles.
    pub dismissed: i64,
    /// Most recent ingestion change.
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// Facade over ingestion and engagement.
#[derive(Debug, Clone)]
pub struct NewsService {
    db: Database,
    coordinator: Arc<IngestionCoordinator>,
    engagement: EngagementService,
    retention_days: u32,
}

impl NewsService {
    /// Create a service from its parts.
    pub fn new(db: Database, coordinator: IngestionCoordinator, promoter: DismissalPromoter) -> Self {
        let engagement = EngagementService::new(db.clone(), promoter);
        Self {
            db,
            coordinator: Arc::new(coordinator),
            engagement,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Create a service for the given configuration.
    pub fn from_config(db: Database, config: &Config) -> Result<Self> {
        let coordinator = IngestionCoordinator::from_config(db.clone(), config)?;
        let promoter = DismissalPromoter::new(
            db.clone(),
            Duration::from_secs(config.engagement.promotion_delay_secs),
        )
        .with_max_retry(Duration::from_secs(config.engagement.promotion_max_retry_secs));

        Ok(Self::new(db, coordinator, promoter).with_retention_days(config.cleanup.retention_days))
    }

    /// Set the retention used by [`cleanup`](Self::cleanup).
    pub fn with_retention_days(mut self, retention_days: u32) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// The underlying database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The engagement state machine.
    pub fn engagement(&self) -> &EngagementService {
        &self.engagement
    }

    /// Run one ingestion pass over all sources.
    pub async fn run_ingestion(&self) -> IngestReport {
        self.coordinator.run().await
    }

    /// Look up an article.
    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        self.articles().get_by_id(article_id).await
    }

    /// List articles matching a filter, newest published first.
    pub async fn list_articles(&self, filter: &ArticleFilter, limit: usize) -> Result<Vec<Article>> {
        self.articles().list(filter, limit).await
    }

    /// Bookmarked articles, most recently bookmarked first.
    pub async fn list_bookmarked(&self, limit: usize) -> Result<Vec<Article>> {
        self.articles().list_bookmarked(limit).await
    }

    /// Read articles, most recently read first.
    pub async fn list_read(&self, limit: usize) -> Result<Vec<Article>> {
        self.articles().list_read(limit).await
    }

    /// Permanently dismissed articles, most recently dismissed first.
    pub async fn list_dismissed(&self, limit: usize) -> Result<Vec<Article>> {
        self.articles().list_dismissed(limit).await
    }

    /// Articles dismissed in the last day, pending or permanent.
    pub async fn list_recently_dismissed(&self) -> Result<Vec<Article>> {
        let since = Utc::now() - chrono::Duration::hours(RECENTLY_DISMISSED_HOURS);
        self.articles()
            .list_recently_dismissed(since, RECENTLY_DISMISSED_LIMIT)
            .await
    }

    /// Engagement state of an article.
    pub async fn state(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.state(article_id).await
    }

    /// Bookmark an article.
    pub async fn bookmark(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.bookmark(article_id).await
    }

    /// Remove a bookmark.
    pub async fn unbookmark(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.unbookmark(article_id).await
    }

    /// Flip the bookmark flag.
    pub async fn toggle_bookmark(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.toggle_bookmark(article_id).await
    }

    /// Mark an article as read.
    pub async fn mark_read(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.mark_read(article_id).await
    }

    /// Remove a read mark.
    pub async fn unmark_read(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.unmark_read(article_id).await
    }

    /// Flip the read flag.
    pub async fn toggle_read(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.toggle_read(article_id).await
    }

    /// Dismiss an article; it becomes permanent after the promotion delay.
    pub async fn dismiss(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.dismiss(article_id).await
    }

    /// Undo a dismissal.
    pub async fn undismiss(&self, article_id: i64) -> Result<EngagementState> {
        self.engagement.undismiss(article_id).await
    }

    /// Schedule promotion of every pending dismissal in the database.
    ///
    /// Returns how many promotions were scheduled.
    pub async fn resume_promotions(&self) -> Result<usize> {
        self.engagement.promoter().resume_pending().await
    }

    /// Aggregate numbers about the stored feed.
    pub async fn stats(&self) -> Result<FeedStats> {
        let articles = self.articles();
        Ok(FeedStats {
            articles: articles.count().await?,
            dismissed: DismissalRepository::new(self.db.pool()).count(true).await?,
            last_updated_at: articles.last_updated_at().await?,
        })
    }

    /// Delete articles permanently dismissed longer ago than the retention.
    ///
    /// Returns the number of deleted articles.
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = chrono::Duration::try_days(i64::from(self.retention_days))
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .ok_or_else(|| {
                DevNewsError::Config(format!(
                    "retention of {} days is out of range",
                    self.retention_days
                ))
            })?;
        let deleted = self.articles().delete_dismissed_before(cutoff).await?;
        info!(
            "Cleaned up {} dismissed article(s) older than {} days",
            deleted, self.retention_days
        );
        Ok(deleted)
    }

    /// Stop pending promotions and close the database.
    ///
    /// Dismissals still pending stay in the database and are resumed by
    /// [`resume_promotions`](Self::resume_promotions).
    pub async fn shutdown(&self) {
        self.engagement.promoter().cancel_all();
        self.db.close().await;
    }

    fn articles(&self) -> ArticleRepository<'_> {
        ArticleRepository::new(self.db.pool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::NewArticle;
    use crate::engagement::{DismissalState, NewDismissal};

    async fn setup() -> NewsService {
        let db = Database::open_in_memory().await.unwrap();
        let coordinator = IngestionCoordinator::new(db.clone(), Vec::new());
        let promoter = DismissalPromoter::new(db.clone(), Duration::from_secs(60));
        NewsService::new(db, coordinator, promoter)
    }

    async fn add_article(service: &NewsService, id: &str) -> i64 {
        let record = NewArticle::new(id, "dev_to", format!("Article {}", id), "https://dev.to", Utc::now());
        let (article, _) = ArticleRepository::new(service.db().pool())
            .upsert(&record)
            .await
            .unwrap();
        article.id
    }

    #[tokio::test]
    async fn test_listings_follow_engagement() {
        let service = setup().await;
        let a = add_article(&service, "a").await;
        let b = add_article(&service, "b").await;

        service.bookmark(a).await.unwrap();
        service.mark_read(b).await.unwrap();
        service.dismiss(b).await.unwrap();

        let bookmarked = service.list_bookmarked(DEFAULT_LIST_LIMIT).await.unwrap();
        assert_eq!(bookmarked.iter().map(|x| x.id).collect::<Vec<_>>(), vec![a]);

        let read = service.list_read(DEFAULT_LIST_LIMIT).await.unwrap();
        assert_eq!(read.iter().map(|x| x.id).collect::<Vec<_>>(), vec![b]);

        // Pending dismissals are not yet in the dismissed listing.
        assert!(service.list_dismissed(DEFAULT_LIST_LIMIT).await.unwrap().is_empty());
        let recent = service.list_recently_dismissed().await.unwrap();
        assert_eq!(recent.iter().map(|x| x.id).collect::<Vec<_>>(), vec![b]);
    }

    #[tokio::test]
    async fn test_stats() {
        let service = setup().await;
        assert_eq!(
            service.stats().await.unwrap(),
            FeedStats {
                articles: 0,
                dismissed: 0,
                last_updated_at: None
            }
        );

        let id = add_article(&service, "a").await;
        service.dismiss(id).await.unwrap();
        let stats = service.stats().await.unwrap();
        assert_eq!(stats.articles, 1);
        assert_eq!(stats.dismissed, 0);
        assert!(stats.last_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_with_out_of_range_retention_fails() {
        let service = setup().await.with_retention_days(u32::MAX);
        add_article(&service, "a").await;

        let result = service.cleanup().await;
        assert!(matches!(result, Err(DevNewsError::Config(_))));
        assert_eq!(service.stats().await.unwrap().articles, 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_permanent_dismissals() {
        let service = setup().await.with_retention_days(30);
        let old_permanent = add_article(&service, "old").await;
        let old_pending = add_article(&service, "pending").await;
        let recent_permanent = add_article(&service, "recent").await;
        let untouched = add_article(&service, "active").await;

        let dismissals = DismissalRepository::new(service.db().pool());
        let long_ago = Utc::now() - chrono::Duration::days(45);
        for (article_id, at, permanent) in [
            (old_permanent, long_ago, true),
            (old_pending, long_ago, false),
            (recent_permanent, Utc::now(), true),
        ] {
            let (dismissal, _) = dismissals
                .create(&NewDismissal::new(article_id).with_dismissed_at(at))
                .await
                .unwrap();
            if permanent {
                dismissals.mark_permanent(dismissal.id).await.unwrap();
            }
        }

        assert_eq!(service.cleanup().await.unwrap(), 1);
        assert!(service.get_article(old_permanent).await.unwrap().is_none());
        assert!(service.get_article(old_pending).await.unwrap().is_some());
        assert_eq!(
            service.state(recent_permanent).await.unwrap().dismissal,
            DismissalState::Permanent
        );
        assert!(service.get_article(untouched).await.unwrap().is_some());
    }
}
