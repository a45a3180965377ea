//! Ingestion runs across all configured sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::article::{ArticleRepository, NewArticle, UpsertOutcome};
use crate::config::Config;
use crate::db::Database;
use crate::source::{build_fetchers, SourceFetcher};
use crate::Result;

/// Default upper bound on one source's fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of sources fetched at once.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// A source that contributed nothing to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    /// Source name.
    pub source: String,
    /// What went wrong.
    pub error: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Records stored (created, updated or already current).
    pub items_processed: usize,
    /// Records that created a new article.
    pub created: usize,
    /// Records that changed an existing article.
    pub updated: usize,
    /// Wall-clock duration in seconds, rounded to two decimals.
    pub duration_secs: f64,
    /// Sources whose fetch succeeded, in configured order.
    pub sources_succeeded: Vec<String>,
    /// Sources whose fetch failed or timed out, in configured order.
    pub sources_failed: Vec<SourceFailure>,
    /// When the run completed.
    pub finished_at: DateTime<Utc>,
}

/// Per-source result, before aggregation.
#[derive(Debug, Default)]
struct SourceRun {
    processed: usize,
    created: usize,
    updated: usize,
    error: Option<String>,
}

/// Drives every fetcher and upserts what they return.
pub struct IngestionCoordinator {
    db: Database,
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    fetch_timeout: Duration,
    max_concurrent: usize,
}

impl IngestionCoordinator {
    /// Create a coordinator over the given fetchers.
    pub fn new(db: Database, fetchers: Vec<Box<dyn SourceFetcher>>) -> Self {
        Self {
            db,
            fetchers: fetchers.into_iter().map(Arc::from).collect(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    /// Create a coordinator for the configured sources.
    pub fn from_config(db: Database, config: &Config) -> Result<Self> {
        let fetchers = build_fetchers(&config.ingest, &config.sources)?;
        Ok(Self::new(db, fetchers)
            .with_fetch_timeout(Duration::from_secs(config.ingest.fetch_timeout_secs))
            .with_max_concurrent(config.ingest.max_concurrent_fetches))
    }

    /// Set the per-source fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set how many sources are fetched at once.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Names of the configured sources.
    pub fn source_names(&self) -> Vec<String> {
        self.fetchers.iter().map(|f| f.name().to_string()).collect()
    }

    /// Run every fetcher once and store the results.
    ///
    /// Never fails: a source that errors, times out or panics is recorded in
    /// the report and contributes nothing. Dropping the returned future
    /// aborts fetches still in flight.
    pub async fn run(&self) -> IngestReport {
        info!(
            "Starting news aggregation from {} source(s)...",
            self.fetchers.len()
        );
        let start = Instant::now();

        let mut runs: Vec<(usize, String, SourceRun)> = stream::iter(self.fetchers.iter().enumerate())
            .map(|(index, fetcher)| async move {
                let name = fetcher.name().to_string();
                let run = self.run_source(Arc::clone(fetcher)).await;
                (index, name, run)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        runs.sort_by_key(|(index, _, _)| *index);

        let mut report = IngestReport {
            items_processed: 0,
            created: 0,
            updated: 0,
            duration_secs: 0.0,
            sources_succeeded: Vec::new(),
            sources_failed: Vec::new(),
            finished_at: Utc::now(),
        };
        for (_, name, run) in runs {
            report.items_processed += run.processed;
            report.created += run.created;
            report.updated += run.updated;
            match run.error {
                None => report.sources_succeeded.push(name),
                Some(error) => report.sources_failed.push(SourceFailure {
                    source: name,
                    error,
                }),
            }
        }
        report.duration_secs = round_secs(start.elapsed());
        report.finished_at = Utc::now();

        info!(
            "News aggregation completed in {}s. Total articles processed: {} ({} new, {} updated, {} source(s) failed)",
            report.duration_secs,
            report.items_processed,
            report.created,
            report.updated,
            report.sources_failed.len()
        );
        report
    }

    async fn run_source(&self, fetcher: Arc<dyn SourceFetcher>) -> SourceRun {
        let name = fetcher.name().to_string();
        let timeout = self.fetch_timeout;

        // A panicking fetcher only takes down its own task. The set aborts the
        // task if this run is dropped before it finishes.
        let mut task = JoinSet::new();
        task.spawn(async move { tokio::time::timeout(timeout, fetcher.fetch()).await });

        let records = match task.join_next().await {
            Some(Ok(Ok(Ok(records)))) => records,
            Some(Ok(Ok(Err(e)))) => return source_failed(&name, e.to_string()),
            Some(Ok(Err(_))) => {
                return source_failed(&name, format!("timed out after {:?}", timeout))
            }
            Some(Err(e)) => return source_failed(&name, format!("fetch task failed: {}", e)),
            None => return source_failed(&name, "fetch task vanished".to_string()),
        };

        let run = self.store(&name, &records).await;
        info!("{}: fetched {} articles", name, run.processed);
        run
    }

    async fn store(&self, name: &str, records: &[NewArticle]) -> SourceRun {
        let repo = ArticleRepository::new(self.db.pool());
        let mut run = SourceRun::default();

        for record in records {
            match repo.upsert(record).await {
                Ok((article, outcome)) => {
                    run.processed += 1;
                    match outcome {
                        UpsertOutcome::Created => run.created += 1,
                        UpsertOutcome::Updated => run.updated += 1,
                        UpsertOutcome::Unchanged => {
                            debug!("{}: article {} unchanged", name, article.id)
                        }
                    }
                }
                Err(e) => {
                    error!(
                        "{}: failed to store article {}: {}",
                        name, record.external_id, e
                    );
                }
            }
        }
        run
    }
}

impl std::fmt::Debug for IngestionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionCoordinator")
            .field("sources", &self.source_names())
            .field("fetch_timeout", &self.fetch_timeout)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

fn source_failed(name: &str, error: String) -> SourceRun {
    error!("Error with {}: {}", name, error);
    SourceRun {
        error: Some(error),
        ..SourceRun::default()
    }
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
