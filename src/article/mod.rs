//! Article storage for devnews.
//!
//! Canonical articles are keyed by `(external_id, source_type)`; ingestion
//! upserts into this store and engagement state attaches to its rows.

pub mod repository;
pub mod types;

pub use repository::ArticleRepository;
pub use types::{
    Article, ArticleFilter, ArticleScope, NewArticle, UpsertOutcome, MAX_DESCRIPTION_LENGTH,
};
