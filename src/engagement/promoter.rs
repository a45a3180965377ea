//! Delayed promotion of pending dismissals.
//!
//! A dismissal starts out pending. After a fixed delay the promoter turns it
//! permanent, unless the dismissal was undone in the meantime. Tasks carry
//! only the dismissal ID and re-check the row when they fire, so an undo
//! that races the timer always wins.
//!
//! Scheduled tasks live only in this process. Pending rows left behind by a
//! restart, or by a promotion that gave up retrying, are picked up again by
//! [`DismissalPromoter::resume_pending`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use super::repository::DismissalRepository;
use super::types::PromotionOutcome;
use crate::db::Database;
use crate::Result;

/// Default delay before a pending dismissal becomes permanent.
pub const DEFAULT_PROMOTION_DELAY: Duration = Duration::from_secs(15);

/// Default upper bound on time spent retrying a failed promotion.
pub const DEFAULT_MAX_RETRY: Duration = Duration::from_secs(60);

const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(100);
const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(5);

/// Schedules and runs dismissal promotions.
///
/// Cloning is cheap; clones share the same set of scheduled tasks.
#[derive(Clone)]
pub struct DismissalPromoter {
    db: Database,
    delay: Duration,
    max_retry: Duration,
    scheduled: Arc<Mutex<HashMap<i64, AbortHandle>>>,
}

impl DismissalPromoter {
    /// Create a promoter with the given delay.
    pub fn new(db: Database, delay: Duration) -> Self {
        Self {
            db,
            delay,
            max_retry: DEFAULT_MAX_RETRY,
            scheduled: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Set how long storage failures are retried before giving up.
    pub fn with_max_retry(mut self, max_retry: Duration) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// The configured promotion delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule promotion of a dismissal after the configured delay.
    ///
    /// The returned handle resolves to the promotion outcome. Dropping it
    /// does not cancel the task.
    pub fn schedule(&self, dismissal_id: i64) -> JoinHandle<Result<PromotionOutcome>> {
        self.schedule_after(dismissal_id, self.delay)
    }

    /// Schedule every pending dismissal found in the database.
    ///
    /// Each one fires once its delay, counted from `dismissed_at`, has run
    /// out; overdue ones fire immediately. Dismissals that already have a
    /// waiting task are left alone. Returns how many were scheduled.
    pub async fn resume_pending(&self) -> Result<usize> {
        let pending = DismissalRepository::new(self.db.pool()).list_pending().await?;

        let mut resumed = 0;
        for dismissal in pending {
            if self.lock_scheduled().contains_key(&dismissal.id) {
                continue;
            }
            let elapsed = (Utc::now() - dismissal.dismissed_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.schedule_after(dismissal.id, self.delay.saturating_sub(elapsed));
            resumed += 1;
        }

        if resumed > 0 {
            info!("Resumed {} pending dismissal promotion(s)", resumed);
        }
        Ok(resumed)
    }

    fn schedule_after(
        &self,
        dismissal_id: i64,
        delay: Duration,
    ) -> JoinHandle<Result<PromotionOutcome>> {
        let promoter = self.clone();

        // Hold the lock across spawn and insert so a zero-delay task cannot
        // deregister itself before it is registered.
        let mut scheduled = self.lock_scheduled();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            promoter.lock_scheduled().remove(&dismissal_id);
            promoter.promote_with_retry(dismissal_id).await
        });
        if let Some(previous) = scheduled.insert(dismissal_id, handle.abort_handle()) {
            previous.abort();
        }
        drop(scheduled);

        debug!(
            "Scheduled promotion of dismissal {} in {:?}",
            dismissal_id, delay
        );
        handle
    }

    /// Cancel a scheduled promotion.
    ///
    /// Returns `true` if a task was still waiting. Cancellation is an
    /// optimization only; a task that already fired finds the row gone.
    pub fn cancel(&self, dismissal_id: i64) -> bool {
        match self.lock_scheduled().remove(&dismissal_id) {
            Some(handle) => {
                handle.abort();
                debug!("Cancelled promotion of dismissal {}", dismissal_id);
                true
            }
            None => false,
        }
    }

    /// Cancel every scheduled promotion.
    pub fn cancel_all(&self) {
        let mut scheduled = self.lock_scheduled();
        for (_, handle) in scheduled.drain() {
            handle.abort();
        }
    }

    /// Number of promotions still waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.lock_scheduled().len()
    }

    /// Promote a dismissal now.
    ///
    /// A missing or already-permanent dismissal is a normal outcome, not an
    /// error.
    pub async fn promote(&self, dismissal_id: i64) -> Result<PromotionOutcome> {
        let repo = DismissalRepository::new(self.db.pool());

        let dismissal = match repo.get_by_id(dismissal_id).await? {
            Some(dismissal) => dismissal,
            None => return Ok(PromotionOutcome::Missing),
        };
        if dismissal.permanent {
            return Ok(PromotionOutcome::AlreadyPermanent);
        }

        if repo.mark_permanent(dismissal_id).await? {
            info!(
                "Dismissal {} of article {} is now permanent",
                dismissal_id, dismissal.article_id
            );
            return Ok(PromotionOutcome::Promoted);
        }

        // Lost a race between the read and the write.
        match repo.get_by_id(dismissal_id).await? {
            Some(_) => Ok(PromotionOutcome::AlreadyPermanent),
            None => Ok(PromotionOutcome::Missing),
        }
    }

    async fn promote_with_retry(&self, dismissal_id: i64) -> Result<PromotionOutcome> {
        let mut backoff = ExponentialBackoff {
            current_interval: RETRY_INITIAL_INTERVAL,
            initial_interval: RETRY_INITIAL_INTERVAL,
            max_interval: RETRY_MAX_INTERVAL,
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_retry),
            ..Default::default()
        };

        loop {
            match self.promote(dismissal_id).await {
                Ok(outcome) => {
                    if outcome != PromotionOutcome::Promoted {
                        debug!(
                            "Promotion of dismissal {} skipped: {:?}",
                            dismissal_id, outcome
                        );
                    }
                    return Ok(outcome);
                }
                Err(e) => match backoff.next_backoff() {
                    Some(wait) => {
                        warn!(
                            "Promotion of dismissal {} failed, retrying in {:?}: {}",
                            dismissal_id, wait, e
                        );
                        tokio::time::sleep(wait).await;
                    }
                    None => {
                        error!(
                            "Giving up on promotion of dismissal {}, left pending: {}",
                            dismissal_id, e
                        );
                        return Err(e);
                    }
                },
            }
        }
    }

    fn lock_scheduled(&self) -> MutexGuard<'_, HashMap<i64, AbortHandle>> {
        self.scheduled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for DismissalPromoter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DismissalPromoter")
            .field("delay", &self.delay)
            .field("max_retry", &self.max_retry)
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{ArticleRepository, NewArticle};
    use crate::engagement::types::NewDismissal;

    async fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let record = NewArticle::new("p1", "dev_to", "Pending", "https://dev.to/p1", Utc::now());
        let (article, _) = ArticleRepository::new(db.pool())
            .upsert(&record)
            .await
            .unwrap();
        let (dismissal, _) = DismissalRepository::new(db.pool())
            .create(&NewDismissal::new(article.id))
            .await
            .unwrap();
        (db, dismissal.id)
    }

    #[tokio::test]
    async fn test_promote_pending() {
        let (db, dismissal_id) = setup().await;
        let promoter = DismissalPromoter::new(db.clone(), Duration::ZERO);

        assert_eq!(
            promoter.promote(dismissal_id).await.unwrap(),
            PromotionOutcome::Promoted
        );
        let stored = DismissalRepository::new(db.pool())
            .get_by_id(dismissal_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.permanent);
    }

    #[tokio::test]
    async fn test_promote_twice_is_noop() {
        let (db, dismissal_id) = setup().await;
        let promoter = DismissalPromoter::new(db, Duration::ZERO);

        promoter.promote(dismissal_id).await.unwrap();
        assert_eq!(
            promoter.promote(dismissal_id).await.unwrap(),
            PromotionOutcome::AlreadyPermanent
        );
    }

    #[tokio::test]
    async fn test_promote_missing() {
        let (db, _) = setup().await;
        let promoter = DismissalPromoter::new(db, Duration::ZERO);

        assert_eq!(
            promoter.promote(424242).await.unwrap(),
            PromotionOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_scheduled_promotion_fires_after_delay() {
        let (db, dismissal_id) = setup().await;
        let promoter = DismissalPromoter::new(db, Duration::from_millis(20));

        let handle = promoter.schedule(dismissal_id);
        assert_eq!(promoter.pending_count(), 1);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, PromotionOutcome::Promoted);
        assert_eq!(promoter.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_prevents_promotion() {
        let (db, dismissal_id) = setup().await;
        let promoter = DismissalPromoter::new(db.clone(), Duration::from_millis(200));

        let handle = promoter.schedule(dismissal_id);
        assert!(promoter.cancel(dismissal_id));
        assert!(!promoter.cancel(dismissal_id));
        assert!(handle.await.unwrap_err().is_cancelled());

        let stored = DismissalRepository::new(db.pool())
            .get_by_id(dismissal_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.permanent);
    }

    #[tokio::test]
    async fn test_fired_promotion_after_delete_is_missing() {
        let (db, dismissal_id) = setup().await;
        let promoter = DismissalPromoter::new(db.clone(), Duration::from_millis(20));

        let stored = DismissalRepository::new(db.pool())
            .get_by_id(dismissal_id)
            .await
            .unwrap()
            .unwrap();
        let handle = promoter.schedule(dismissal_id);
        DismissalRepository::new(db.pool())
            .delete_by_article(stored.article_id)
            .await
            .unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), PromotionOutcome::Missing);
    }

    #[tokio::test]
    async fn test_resume_promotes_overdue_dismissal() {
        let db = Database::open_in_memory().await.unwrap();
        let record = NewArticle::new("old", "dev_to", "Old", "https://dev.to/old", Utc::now());
        let (article, _) = ArticleRepository::new(db.pool())
            .upsert(&record)
            .await
            .unwrap();
        let dismissed_at = Utc::now() - chrono::Duration::hours(1);
        let (dismissal, _) = DismissalRepository::new(db.pool())
            .create(&NewDismissal::new(article.id).with_dismissed_at(dismissed_at))
            .await
            .unwrap();

        // The delay has long passed, so the resumed task fires at once.
        let promoter = DismissalPromoter::new(db.clone(), Duration::from_secs(15));
        assert_eq!(promoter.resume_pending().await.unwrap(), 1);

        let mut permanent = false;
        for _ in 0..200 {
            let stored = DismissalRepository::new(db.pool())
                .get_by_id(dismissal.id)
                .await
                .unwrap()
                .unwrap();
            if stored.permanent {
                permanent = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(permanent);
    }

    #[tokio::test]
    async fn test_resume_waits_out_remaining_delay() {
        let (db, dismissal_id) = setup().await;
        let promoter = DismissalPromoter::new(db.clone(), Duration::from_secs(3600));

        assert_eq!(promoter.resume_pending().await.unwrap(), 1);
        assert_eq!(promoter.pending_count(), 1);
        // Already waiting, so a second sweep schedules nothing.
        assert_eq!(promoter.resume_pending().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = DismissalRepository::new(db.pool())
            .get_by_id(dismissal_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.permanent);
        promoter.cancel_all();
    }

    #[tokio::test]
    async fn test_resume_skips_permanent() {
        let (db, dismissal_id) = setup().await;
        let promoter = DismissalPromoter::new(db, Duration::from_secs(3600));

        promoter.promote(dismissal_id).await.unwrap();
        assert_eq!(promoter.resume_pending().await.unwrap(), 0);
        assert_eq!(promoter.pending_count(), 0);
    }
}
