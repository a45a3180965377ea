//! Ingestion module for devnews.
//!
//! [`IngestionCoordinator`] runs every source fetcher under a timeout and
//! upserts the results; [`IngestScheduler`] repeats that (and the cleanup
//! pass) on an interval.

pub mod coordinator;
pub mod scheduler;

pub use coordinator::{
    IngestReport, IngestionCoordinator, SourceFailure, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_FETCHES,
};
pub use scheduler::IngestScheduler;
