//! Engagement service for devnews.
//!
//! Client actions on an article (bookmark, read, dismiss and their
//! inverses) all go through here and report the resulting
//! [`EngagementState`].

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::promoter::DismissalPromoter;
use super::repository::{BookmarkRepository, DismissalRepository, ReadMarkRepository};
use super::types::{DismissalState, EngagementState, NewBookmark, NewDismissal, NewReadMark};
use crate::article::ArticleRepository;
use crate::db::Database;
use crate::{DevNewsError, Result};

/// Engagement state machine over stored articles.
#[derive(Debug, Clone)]
pub struct EngagementService {
    db: Database,
    promoter: DismissalPromoter,
}

impl EngagementService {
    /// Create a new engagement service.
    pub fn new(db: Database, promoter: DismissalPromoter) -> Self {
        Self { db, promoter }
    }

    /// The promoter used for dismissals.
    pub fn promoter(&self) -> &DismissalPromoter {
        &self.promoter
    }

    /// Current engagement state of an article.
    pub async fn state(&self, article_id: i64) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        self.load_state(article_id).await
    }

    /// Bookmark an article. Idempotent.
    pub async fn bookmark(&self, article_id: i64) -> Result<EngagementState> {
        self.bookmark_at(article_id, Utc::now()).await
    }

    /// Bookmark an article with an explicit timestamp.
    ///
    /// An existing bookmark keeps its original timestamp.
    pub async fn bookmark_at(
        &self,
        article_id: i64,
        at: DateTime<Utc>,
    ) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        BookmarkRepository::new(self.db.pool())
            .create(&NewBookmark::new(article_id).with_bookmarked_at(at))
            .await?;
        self.load_state(article_id).await
    }

    /// Remove a bookmark. Idempotent.
    pub async fn unbookmark(&self, article_id: i64) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        BookmarkRepository::new(self.db.pool())
            .delete_by_article(article_id)
            .await?;
        self.load_state(article_id).await
    }

    /// Flip the bookmark flag.
    pub async fn toggle_bookmark(&self, article_id: i64) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        let repo = BookmarkRepository::new(self.db.pool());
        if !repo.delete_by_article(article_id).await? {
            repo.create(&NewBookmark::new(article_id)).await?;
        }
        self.load_state(article_id).await
    }

    /// Mark an article as read. Idempotent.
    pub async fn mark_read(&self, article_id: i64) -> Result<EngagementState> {
        self.mark_read_at(article_id, Utc::now()).await
    }

    /// Mark an article as read with an explicit timestamp.
    pub async fn mark_read_at(
        &self,
        article_id: i64,
        at: DateTime<Utc>,
    ) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        ReadMarkRepository::new(self.db.pool())
            .create(&NewReadMark::new(article_id).with_read_at(at))
            .await?;
        self.load_state(article_id).await
    }

    /// Remove a read mark. Idempotent.
    pub async fn unmark_read(&self, article_id: i64) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        ReadMarkRepository::new(self.db.pool())
            .delete_by_article(article_id)
            .await?;
        self.load_state(article_id).await
    }

    /// Flip the read flag.
    pub async fn toggle_read(&self, article_id: i64) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        let repo = ReadMarkRepository::new(self.db.pool());
        if !repo.delete_by_article(article_id).await? {
            repo.create(&NewReadMark::new(article_id)).await?;
        }
        self.load_state(article_id).await
    }

    /// Dismiss an article.
    ///
    /// A new dismissal starts pending and is promoted after the configured
    /// delay. Dismissing an already dismissed article changes nothing and
    /// schedules nothing.
    pub async fn dismiss(&self, article_id: i64) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        let (dismissal, created) = DismissalRepository::new(self.db.pool())
            .create(&NewDismissal::new(article_id))
            .await?;

        if created {
            self.promoter.schedule(dismissal.id);
            info!("Dismissed article {}", article_id);
        } else {
            debug!(
                "Article {} already dismissed ({})",
                article_id,
                dismissal.state()
            );
        }
        self.load_state(article_id).await
    }

    /// Undo a dismissal, pending or permanent.
    pub async fn undismiss(&self, article_id: i64) -> Result<EngagementState> {
        self.ensure_article(article_id).await?;
        if let Some(dismissal_id) = DismissalRepository::new(self.db.pool())
            .delete_by_article(article_id)
            .await?
        {
            self.promoter.cancel(dismissal_id);
            info!("Restored article {}", article_id);
        }
        self.load_state(article_id).await
    }

    async fn ensure_article(&self, article_id: i64) -> Result<()> {
        match ArticleRepository::new(self.db.pool())
            .get_by_id(article_id)
            .await?
        {
            Some(_) => Ok(()),
            None => Err(DevNewsError::NotFound(format!("article {}", article_id))),
        }
    }

    async fn load_state(&self, article_id: i64) -> Result<EngagementState> {
        let pool = self.db.pool();
        let bookmarked = BookmarkRepository::new(pool)
            .get_by_article(article_id)
            .await?
            .is_some();
        let read = ReadMarkRepository::new(pool)
            .get_by_article(article_id)
            .await?
            .is_some();
        let dismissal = DismissalRepository::new(pool)
            .get_by_article(article_id)
            .await?;

        Ok(EngagementState {
            article_id,
            bookmarked,
            read,
            dismissal: DismissalState::of(dismissal.as_ref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::NewArticle;
    use chrono::TimeZone;
    use std::time::Duration;

    async fn setup(delay: Duration) -> (EngagementService, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let record = NewArticle::new("e1", "hacker_news", "Story", "https://example.com/e1", Utc::now());
        let (article, _) = ArticleRepository::new(db.pool())
            .upsert(&record)
            .await
            .unwrap();
        let promoter = DismissalPromoter::new(db.clone(), delay);
        (EngagementService::new(db, promoter), article.id)
    }

    #[tokio::test]
    async fn test_fresh_article_is_active() {
        let (service, id) = setup(Duration::from_secs(60)).await;
        let state = service.state(id).await.unwrap();
        assert!(!state.bookmarked);
        assert!(!state.read);
        assert_eq!(state.dismissal, DismissalState::Active);
    }

    #[tokio::test]
    async fn test_unknown_article_is_not_found() {
        let (service, _) = setup(Duration::from_secs(60)).await;
        let err = service.bookmark(9999).await.unwrap_err();
        assert!(matches!(err, DevNewsError::NotFound(_)));
        assert!(matches!(
            service.dismiss(9999).await.unwrap_err(),
            DevNewsError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_bookmark_idempotent_and_toggle() {
        let (service, id) = setup(Duration::from_secs(60)).await;

        assert!(service.bookmark(id).await.unwrap().bookmarked);
        assert!(service.bookmark(id).await.unwrap().bookmarked);
        assert!(!service.toggle_bookmark(id).await.unwrap().bookmarked);
        assert!(service.toggle_bookmark(id).await.unwrap().bookmarked);
        assert!(!service.unbookmark(id).await.unwrap().bookmarked);
        assert!(!service.unbookmark(id).await.unwrap().bookmarked);
    }

    #[tokio::test]
    async fn test_bookmark_at_keeps_first_timestamp() {
        let (service, id) = setup(Duration::from_secs(60)).await;
        let first = Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 9, 2, 9, 0, 0).unwrap();

        service.bookmark_at(id, first).await.unwrap();
        service.bookmark_at(id, second).await.unwrap();

        let bookmark = BookmarkRepository::new(service.db.pool())
            .get_by_article(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bookmark.bookmarked_at, first);
    }

    #[tokio::test]
    async fn test_read_toggle() {
        let (service, id) = setup(Duration::from_secs(60)).await;

        assert!(service.toggle_read(id).await.unwrap().read);
        assert!(service.mark_read(id).await.unwrap().read);
        assert!(!service.toggle_read(id).await.unwrap().read);
        assert!(!service.unmark_read(id).await.unwrap().read);
    }

    #[tokio::test]
    async fn test_dismiss_is_pending_then_undo() {
        let (service, id) = setup(Duration::from_secs(60)).await;

        let state = service.dismiss(id).await.unwrap();
        assert_eq!(state.dismissal, DismissalState::Pending);
        assert_eq!(service.promoter().pending_count(), 1);

        let state = service.undismiss(id).await.unwrap();
        assert_eq!(state.dismissal, DismissalState::Active);
        assert_eq!(service.promoter().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_second_dismiss_schedules_nothing() {
        let (service, id) = setup(Duration::from_secs(60)).await;

        service.dismiss(id).await.unwrap();
        service.dismiss(id).await.unwrap();
        assert_eq!(service.promoter().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_promotes_after_delay() {
        let (service, id) = setup(Duration::from_millis(20)).await;

        service.dismiss(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let state = service.state(id).await.unwrap();
        assert_eq!(state.dismissal, DismissalState::Permanent);
        assert!(state.dismissed());

        // Permanent dismissals can still be undone.
        let state = service.undismiss(id).await.unwrap();
        assert_eq!(state.dismissal, DismissalState::Active);
    }

    #[tokio::test]
    async fn test_flags_are_independent() {
        let (service, id) = setup(Duration::from_secs(60)).await;

        service.bookmark(id).await.unwrap();
        service.mark_read(id).await.unwrap();
        let state = service.dismiss(id).await.unwrap();

        assert!(state.bookmarked);
        assert!(state.read);
        assert_eq!(state.dismissal, DismissalState::Pending);
    }
}
