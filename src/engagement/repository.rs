//! Bookmark, read mark and dismissal repositories for devnews.
//!
//! Each attachment table holds at most one row per article. Creation uses
//! `INSERT OR IGNORE` followed by a read so that two concurrent writers both
//! observe the same single row.

use chrono::Utc;
use tracing::debug;

use super::types::{Bookmark, Dismissal, NewBookmark, NewDismissal, NewReadMark, ReadMark};
use crate::db::{parse_datetime, to_db_timestamp, DbPool, SQL_FALSE, SQL_TRUE};
use crate::{DevNewsError, Result};

/// Row type for a bookmark from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct BookmarkRow {
    id: i64,
    article_id: i64,
    bookmarked_at: String,
    created_at: String,
}

impl From<BookmarkRow> for Bookmark {
    fn from(row: BookmarkRow) -> Self {
        Bookmark {
            id: row.id,
            article_id: row.article_id,
            bookmarked_at: parse_datetime(&row.bookmarked_at).unwrap_or_else(Utc::now),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for a read mark from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ReadMarkRow {
    id: i64,
    article_id: i64,
    read_at: String,
    created_at: String,
}

impl From<ReadMarkRow> for ReadMark {
    fn from(row: ReadMarkRow) -> Self {
        ReadMark {
            id: row.id,
            article_id: row.article_id,
            read_at: parse_datetime(&row.read_at).unwrap_or_else(Utc::now),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for a dismissal from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct DismissalRow {
    id: i64,
    article_id: i64,
    dismissed_at: String,
    permanent: i64,
    created_at: String,
}

impl From<DismissalRow> for Dismissal {
    fn from(row: DismissalRow) -> Self {
        Dismissal {
            id: row.id,
            article_id: row.article_id,
            dismissed_at: parse_datetime(&row.dismissed_at).unwrap_or_else(Utc::now),
            permanent: row.permanent != 0,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for bookmark operations.
pub struct BookmarkRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> BookmarkRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get the bookmark of an article.
    pub async fn get_by_article(&self, article_id: i64) -> Result<Option<Bookmark>> {
        let row = sqlx::query_as::<_, BookmarkRow>(
            "SELECT id, article_id, bookmarked_at, created_at FROM bookmarks WHERE article_id = ?",
        )
        .bind(article_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(row.map(Bookmark::from))
    }

    /// Create a bookmark, or return the existing one.
    pub async fn create(&self, new_bookmark: &NewBookmark) -> Result<Bookmark> {
        sqlx::query(
            "INSERT OR IGNORE INTO bookmarks (article_id, bookmarked_at, created_at) VALUES (?, ?, ?)",
        )
        .bind(new_bookmark.article_id)
        .bind(to_db_timestamp(&new_bookmark.bookmarked_at))
        .bind(to_db_timestamp(&Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| DevNewsError::Database(e.to_string()))?;

        self.get_by_article(new_bookmark.article_id)
            .await?
            .ok_or_else(|| DevNewsError::NotFound("bookmark".to_string()))
    }

    /// Remove the bookmark of an article.
    pub async fn delete_by_article(&self, article_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE article_id = ?")
            .bind(article_id)
            .execute(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all bookmarks.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookmarks")
            .fetch_one(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(count.0)
    }
}

/// Repository for read mark operations.
pub struct ReadMarkRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ReadMarkRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get the read mark of an article.
    pub async fn get_by_article(&self, article_id: i64) -> Result<Option<ReadMark>> {
        let row = sqlx::query_as::<_, ReadMarkRow>(
            "SELECT id, article_id, read_at, created_at FROM read_marks WHERE article_id = ?",
        )
        .bind(article_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(row.map(ReadMark::from))
    }

    /// Create a read mark, or return the existing one.
    pub async fn create(&self, new_mark: &NewReadMark) -> Result<ReadMark> {
        sqlx::query(
            "INSERT OR IGNORE INTO read_marks (article_id, read_at, created_at) VALUES (?, ?, ?)",
        )
        .bind(new_mark.article_id)
        .bind(to_db_timestamp(&new_mark.read_at))
        .bind(to_db_timestamp(&Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| DevNewsError::Database(e.to_string()))?;

        self.get_by_article(new_mark.article_id)
            .await?
            .ok_or_else(|| DevNewsError::NotFound("read mark".to_string()))
    }

    /// Remove the read mark of an article.
    pub async fn delete_by_article(&self, article_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM read_marks WHERE article_id = ?")
            .bind(article_id)
            .execute(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all read marks.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM read_marks")
            .fetch_one(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(count.0)
    }
}

/// Repository for dismissal operations.
pub struct DismissalRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> DismissalRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get a dismissal by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Dismissal>> {
        let row = sqlx::query_as::<_, DismissalRow>(
            "SELECT id, article_id, dismissed_at, permanent, created_at FROM dismissals WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(row.map(Dismissal::from))
    }

    /// Get the dismissal of an article.
    pub async fn get_by_article(&self, article_id: i64) -> Result<Option<Dismissal>> {
        let row = sqlx::query_as::<_, DismissalRow>(
            r#"
            SELECT id, article_id, dismissed_at, permanent, created_at
            FROM dismissals WHERE article_id = ?
            "#,
        )
        .bind(article_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(row.map(Dismissal::from))
    }

    /// Create a pending dismissal, or return the existing one.
    ///
    /// The flag is `true` only when this call inserted the row.
    pub async fn create(&self, new_dismissal: &NewDismissal) -> Result<(Dismissal, bool)> {
        let query = format!(
            r#"
            INSERT OR IGNORE INTO dismissals (article_id, dismissed_at, permanent, created_at)
            VALUES (?, ?, {}, ?)
            "#,
            SQL_FALSE
        );
        let result = sqlx::query(&query)
            .bind(new_dismissal.article_id)
            .bind(to_db_timestamp(&new_dismissal.dismissed_at))
            .bind(to_db_timestamp(&Utc::now()))
            .execute(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        let created = result.rows_affected() > 0;
        let dismissal = self
            .get_by_article(new_dismissal.article_id)
            .await?
            .ok_or_else(|| DevNewsError::NotFound("dismissal".to_string()))?;

        if created {
            debug!("Created dismissal {} for article {}", dismissal.id, dismissal.article_id);
        }
        Ok((dismissal, created))
    }

    /// List pending dismissals, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<Dismissal>> {
        let query = format!(
            r#"
            SELECT id, article_id, dismissed_at, permanent, created_at
            FROM dismissals WHERE permanent = {}
            ORDER BY dismissed_at ASC, id ASC
            "#,
            SQL_FALSE
        );
        let rows = sqlx::query_as::<_, DismissalRow>(&query)
            .fetch_all(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Dismissal::from).collect())
    }

    /// Remove the dismissal of an article.
    ///
    /// Returns the removed dismissal's ID, if there was one.
    pub async fn delete_by_article(&self, article_id: i64) -> Result<Option<i64>> {
        let id: Option<i64> =
            sqlx::query_scalar("DELETE FROM dismissals WHERE article_id = ? RETURNING id")
                .bind(article_id)
                .fetch_optional(self.pool)
                .await
                .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(id)
    }

    /// Flip a pending dismissal to permanent.
    ///
    /// Returns `false` when the row is gone or already permanent. No other
    /// column is written.
    pub async fn mark_permanent(&self, id: i64) -> Result<bool> {
        let query = format!(
            "UPDATE dismissals SET permanent = {} WHERE id = ? AND permanent = {}",
            SQL_TRUE, SQL_FALSE
        );
        let result = sqlx::query(&query)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count dismissals, optionally only permanent ones.
    pub async fn count(&self, permanent_only: bool) -> Result<i64> {
        let query = if permanent_only {
            format!("SELECT COUNT(*) FROM dismissals WHERE permanent = {}", SQL_TRUE)
        } else {
            "SELECT COUNT(*) FROM dismissals".to_string()
        };
        let count: (i64,) = sqlx::query_as(&query)
            .fetch_one(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(count.0)
    }
}
