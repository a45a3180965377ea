//! Periodic ingestion and cleanup.

use std::future::Future;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::config::Config;
use crate::service::NewsService;

/// Background scheduler running ingestion and cleanup on fixed intervals.
pub struct IngestScheduler {
    service: NewsService,
    ingest_interval: Duration,
    cleanup_interval: Duration,
}

impl IngestScheduler {
    /// Create a scheduler with explicit intervals.
    pub fn new(service: NewsService, ingest_interval: Duration, cleanup_interval: Duration) -> Self {
        Self {
            service,
            ingest_interval,
            cleanup_interval,
        }
    }

    /// Create a scheduler with the configured intervals.
    pub fn from_config(service: NewsService, config: &Config) -> Self {
        Self::new(
            service,
            Duration::from_secs(config.ingest.interval_secs),
            Duration::from_secs(config.cleanup.interval_secs),
        )
    }

    /// Run until `shutdown` resolves.
    ///
    /// Both jobs fire once immediately, then on their intervals. Every
    /// ingestion tick also resumes pending dismissal promotions. A job still
    /// running when `shutdown` resolves is dropped.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Scheduler started (ingest every {} seconds, cleanup every {} seconds)",
            self.ingest_interval.as_secs(),
            self.cleanup_interval.as_secs()
        );

        let mut ingest_timer = interval(self.ingest_interval);
        ingest_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cleanup_timer = interval(self.cleanup_interval);
        cleanup_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ingest_timer.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.ingest() => {}
                    }
                }
                _ = cleanup_timer.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.cleanup() => {}
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }

    async fn ingest(&self) {
        if let Err(e) = self.service.resume_promotions().await {
            error!("Failed to resume pending dismissals: {}", e);
        }
        let report = self.service.run_ingestion().await;
        if !report.sources_failed.is_empty() {
            error!(
                "Ingestion finished with {} failed source(s)",
                report.sources_failed.len()
            );
        }
    }

    async fn cleanup(&self) {
        if let Err(e) = self.service.cleanup().await {
            error!("Cleanup failed: {}", e);
        }
    }
}
