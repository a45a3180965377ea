//! Engagement module for devnews.
//!
//! This module tracks per-article engagement:
//! - Bookmarks and read marks (idempotent, toggleable)
//! - Dismissals, which start pending and are promoted to permanent by
//!   [`DismissalPromoter`] unless undone first

pub mod promoter;
pub mod repository;
pub mod service;
pub mod types;

pub use promoter::{DismissalPromoter, DEFAULT_MAX_RETRY, DEFAULT_PROMOTION_DELAY};
pub use repository::{BookmarkRepository, DismissalRepository, ReadMarkRepository};
pub use service::EngagementService;
pub use types::{
    Bookmark, Dismissal, DismissalState, EngagementState, NewBookmark, NewDismissal, NewReadMark,
    PromotionOutcome, ReadMark,
};
