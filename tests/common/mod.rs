//! Test helpers for devnews integration tests.
//!
//! Provides stub fetchers and helpers for building databases and services.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use devnews::engagement::DismissalPromoter;
use devnews::{
    Database, DevNewsError, IngestionCoordinator, NewArticle, NewsService, Result, SourceFetcher,
};

/// Delay long enough that no promotion fires during a test.
pub const NEVER: Duration = Duration::from_secs(3600);

/// Fixed publication time used by generated records.
pub fn published_at(hours_ago: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 10, 12, 0, 0).unwrap() - chrono::Duration::hours(hours_ago)
}

/// Build a normalized record.
pub fn record(external_id: &str, source_type: &str) -> NewArticle {
    NewArticle::new(
        external_id,
        source_type,
        format!("Story {}", external_id),
        format!("https://example.com/{}/{}", source_type, external_id),
        published_at(0),
    )
    .with_score(10)
    .with_comment_count(2)
}

/// Open an in-memory database.
pub async fn setup_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// Open a file-backed database in a fresh temporary directory.
///
/// Keep the returned directory alive for as long as the database is used.
pub async fn setup_file_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("devnews.db")).await.unwrap();
    (dir, db)
}

/// Build a service over the given fetchers.
pub fn service_with(
    db: &Database,
    fetchers: Vec<Box<dyn SourceFetcher>>,
    promotion_delay: Duration,
) -> NewsService {
    let coordinator = IngestionCoordinator::new(db.clone(), fetchers)
        .with_fetch_timeout(Duration::from_secs(5));
    let promoter = DismissalPromoter::new(db.clone(), promotion_delay);
    NewsService::new(db.clone(), coordinator, promoter)
}

/// A fetcher returning a replaceable list of records.
pub struct StubFetcher {
    name: String,
    records: Arc<Mutex<Vec<NewArticle>>>,
    calls: Arc<AtomicUsize>,
}

impl StubFetcher {
    /// Create a stub returning `records`.
    pub fn new(name: &str, records: Vec<NewArticle>) -> Self {
        Self {
            name: name.to_string(),
            records: Arc::new(Mutex::new(records)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle for replacing the records between runs.
    pub fn records_handle(&self) -> Arc<Mutex<Vec<NewArticle>>> {
        Arc::clone(&self.records)
    }

    /// Handle for counting fetch calls.
    pub fn calls_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<NewArticle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().unwrap().clone())
    }
}

/// A fetcher that always fails.
pub struct FailingFetcher {
    pub name: String,
}

#[async_trait]
impl SourceFetcher for FailingFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<NewArticle>> {
        Err(DevNewsError::Source("connection refused".to_string()))
    }
}

/// Poll `check` until it returns true or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
