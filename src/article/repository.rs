//! Article repository for devnews.
//!
//! This module provides the deduplicating upsert and the read queries over
//! stored articles.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::types::{Article, ArticleFilter, NewArticle, UpsertOutcome};
use crate::db::{parse_datetime, to_db_timestamp, DbPool, SQL_TRUE};
use crate::{DevNewsError, Result};

/// How many times an upsert re-reads after losing an insert race.
const MAX_UPSERT_ATTEMPTS: usize = 3;

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.url, a.published_at, a.description, \
     a.external_id, a.source_type, a.score, a.comment_count, a.created_at, a.updated_at";

/// Row type for an article from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    url: String,
    published_at: String,
    description: Option<String>,
    external_id: String,
    source_type: String,
    score: i64,
    comment_count: i64,
    created_at: String,
    updated_at: String,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            title: row.title,
            url: row.url,
            published_at: parse_datetime(&row.published_at).unwrap_or_else(Utc::now),
            description: row.description,
            external_id: row.external_id,
            source_type: row.source_type,
            score: row.score,
            comment_count: row.comment_count,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for article operations.
pub struct ArticleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ArticleRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert or update an article by its dedup key.
    ///
    /// An unchanged record performs no write and leaves `updated_at` alone.
    /// Losing an insert race to a concurrent writer falls back to the update
    /// path.
    pub async fn upsert(&self, record: &NewArticle) -> Result<(Article, UpsertOutcome)> {
        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            if let Some(existing) = self
                .get_by_key(&record.external_id, &record.source_type)
                .await?
            {
                if !record.differs_from(&existing) {
                    return Ok((existing, UpsertOutcome::Unchanged));
                }
                let updated = self.update_from_record(existing.id, record).await?;
                debug!("Updated article: {}", updated.title);
                return Ok((updated, UpsertOutcome::Updated));
            }

            match self.insert(record).await? {
                Some(created) => {
                    debug!("Created article: {}", created.title);
                    return Ok((created, UpsertOutcome::Created));
                }
                None => {
                    debug!(
                        "Insert conflict for {}/{} (attempt {}), retrying as update",
                        record.source_type, record.external_id, attempt
                    );
                }
            }
        }

        Err(DevNewsError::Database(format!(
            "upsert of {}/{} kept conflicting",
            record.source_type, record.external_id
        )))
    }

    /// Insert a new article.
    ///
    /// Returns `None` if the dedup key already exists.
    async fn insert(&self, record: &NewArticle) -> Result<Option<Article>> {
        let now = to_db_timestamp(&Utc::now());

        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO articles (title, url, published_at, description, external_id,
                                  source_type, score, comment_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.title)
        .bind(&record.url)
        .bind(to_db_timestamp(&record.published_at))
        .bind(&record.description)
        .bind(&record.external_id)
        .bind(&record.source_type)
        .bind(record.score)
        .bind(record.comment_count)
        .bind(&now)
        .bind(&now)
        .fetch_one(self.pool)
        .await;

        let id = match result {
            Ok(id) => id,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => return Ok(None),
            Err(e) => return Err(DevNewsError::Database(e.to_string())),
        };

        self.get_by_id(id)
            .await?
            .map(Some)
            .ok_or_else(|| DevNewsError::NotFound("article".to_string()))
    }

    /// Overwrite the mutable fields of an article and bump `updated_at`.
    async fn update_from_record(&self, id: i64, record: &NewArticle) -> Result<Article> {
        sqlx::query(
            r#"
            UPDATE articles
            SET title = ?, url = ?, published_at = ?, description = ?,
                score = ?, comment_count = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.title)
        .bind(&record.url)
        .bind(to_db_timestamp(&record.published_at))
        .bind(&record.description)
        .bind(record.score)
        .bind(record.comment_count)
        .bind(to_db_timestamp(&Utc::now()))
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| DevNewsError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DevNewsError::NotFound("article".to_string()))
    }

    /// Get an article by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let query = format!("SELECT {} FROM articles a WHERE a.id = ?", ARTICLE_COLUMNS);
        let row = sqlx::query_as::<_, ArticleRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(row.map(Article::from))
    }

    /// Get an article by its dedup key.
    pub async fn get_by_key(&self, external_id: &str, source_type: &str) -> Result<Option<Article>> {
        let query = format!(
            "SELECT {} FROM articles a WHERE a.external_id = ? AND a.source_type = ?",
            ARTICLE_COLUMNS
        );
        let row = sqlx::query_as::<_, ArticleRow>(&query)
            .bind(external_id)
            .bind(source_type)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(row.map(Article::from))
    }

    /// List articles matching a filter, newest published first.
    pub async fn list(&self, filter: &ArticleFilter, limit: usize) -> Result<Vec<Article>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM articles a", ARTICLE_COLUMNS));

        let mut has_where = false;
        for scope in &filter.scopes {
            query.push(if has_where { " AND " } else { " WHERE " });
            query.push(scope.sql_condition());
            has_where = true;
        }
        if let Some(ref source_type) = filter.source_type {
            query.push(if has_where { " AND " } else { " WHERE " });
            query.push("a.source_type = ");
            query.push_bind(source_type.clone());
        }

        query.push(" ORDER BY a.published_at DESC, a.id DESC LIMIT ");
        query.push_bind(limit as i64);

        let rows = query
            .build_query_as::<ArticleRow>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// List bookmarked articles, most recently bookmarked first.
    pub async fn list_bookmarked(&self, limit: usize) -> Result<Vec<Article>> {
        let query = format!(
            r#"
            SELECT {} FROM articles a
            JOIN bookmarks b ON b.article_id = a.id
            ORDER BY b.bookmarked_at DESC, a.id DESC
            LIMIT ?
            "#,
            ARTICLE_COLUMNS
        );
        self.fetch_all_limited(&query, limit).await
    }

    /// List read articles, most recently read first.
    pub async fn list_read(&self, limit: usize) -> Result<Vec<Article>> {
        let query = format!(
            r#"
            SELECT {} FROM articles a
            JOIN read_marks r ON r.article_id = a.id
            ORDER BY r.read_at DESC, a.id DESC
            LIMIT ?
            "#,
            ARTICLE_COLUMNS
        );
        self.fetch_all_limited(&query, limit).await
    }

    /// List permanently dismissed articles, most recently dismissed first.
    pub async fn list_dismissed(&self, limit: usize) -> Result<Vec<Article>> {
        let query = format!(
            r#"
            SELECT {} FROM articles a
            JOIN dismissals d ON d.article_id = a.id
            WHERE d.permanent = {}
            ORDER BY d.dismissed_at DESC, a.id DESC
            LIMIT ?
            "#,
            ARTICLE_COLUMNS, SQL_TRUE
        );
        self.fetch_all_limited(&query, limit).await
    }

    /// List articles dismissed (pending or permanent) after `since`.
    pub async fn list_recently_dismissed(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let query = format!(
            r#"
            SELECT {} FROM articles a
            JOIN dismissals d ON d.article_id = a.id
            WHERE d.dismissed_at > ?
            ORDER BY d.dismissed_at DESC, a.id DESC
            LIMIT ?
            "#,
            ARTICLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&query)
            .bind(to_db_timestamp(&since))
            .bind(limit as i64)
            .fetch_all(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    async fn fetch_all_limited(&self, query: &str, limit: usize) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(query)
            .bind(limit as i64)
            .fetch_all(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Count all articles.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(count.0)
    }

    /// Most recent `updated_at` across all articles.
    pub async fn last_updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = sqlx::query_scalar("SELECT MAX(updated_at) FROM articles")
            .fetch_one(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(value.and_then(|s| parse_datetime(&s)))
    }

    /// Delete an article; its attachments cascade.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete articles permanently dismissed before `cutoff`.
    pub async fn delete_dismissed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let query = format!(
            r#"
            DELETE FROM articles
            WHERE id IN (
                SELECT article_id FROM dismissals
                WHERE permanent = {} AND dismissed_at < ?
            )
            "#,
            SQL_TRUE
        );
        let result = sqlx::query(&query)
            .bind(to_db_timestamp(&cutoff))
            .execute(self.pool)
            .await
            .map_err(|e| DevNewsError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::{Duration, TimeZone};

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn record(external_id: &str, hours_ago: i64) -> NewArticle {
        let published = Utc.with_ymd_and_hms(2025, 9, 10, 12, 0, 0).unwrap() - Duration::hours(hours_ago);
        NewArticle::new(
            external_id,
            "test_source",
            format!("Article {}", external_id),
            format!("https://example.com/{}", external_id),
            published,
        )
        .with_description("Test description")
        .with_score(100)
        .with_comment_count(10)
    }

    #[tokio::test]
    async fn test_upsert_creates_article() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        let (article, outcome) = repo.upsert(&record("test123", 0)).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        assert!(outcome.was_created());
        assert!(article.id > 0);
        assert_eq!(article.title, "Article test123");
        assert_eq!(article.source_type, "test_source");
        assert_eq!(article.description, Some("Test description".to_string()));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_same_record_is_noop() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        let (first, _) = repo.upsert(&record("test123", 0)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let (second, outcome) = repo.upsert(&record("test123", 0)).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(first.id, second.id);
        assert_eq!(first.updated_at, second.updated_at);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_updates_changed_article_in_place() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        let (existing, _) = repo.upsert(&record("test123", 0)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let mut changed = record("test123", 0).with_score(250);
        changed.title = "Updated Title".to_string();
        let (updated, outcome) = repo.upsert(&changed).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(updated.id, existing.id);
        assert_eq!(updated.title, "Updated Title");
        assert_eq!(updated.score, 250);
        assert!(updated.updated_at > existing.updated_at);
        assert_eq!(updated.created_at, existing.created_at);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_external_id_different_source_is_distinct() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        let hn = record("42", 0);
        let mut reddit = record("42", 0);
        reddit.source_type = "reddit_rust".to_string();

        repo.upsert(&hn).await.unwrap();
        repo.upsert(&reddit).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_conflict_returns_none() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        let rec = record("dup", 0);
        assert!(repo.insert(&rec).await.unwrap().is_some());
        assert!(repo.insert(&rec).await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_orders_by_published_desc_with_limit() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        repo.upsert(&record("old", 10)).await.unwrap();
        repo.upsert(&record("new", 0)).await.unwrap();
        repo.upsert(&record("mid", 5)).await.unwrap();

        let all = repo.list(&ArticleFilter::new(), 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|a| a.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let limited = repo.list(&ArticleFilter::new(), 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_list_by_source_type() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        repo.upsert(&record("a", 0)).await.unwrap();
        let mut other = record("b", 0);
        other.source_type = "dev_to".to_string();
        repo.upsert(&other).await.unwrap();

        let filter = ArticleFilter::new().with_source_type("dev_to");
        let found = repo.list(&filter, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_id, "b");
    }

    #[tokio::test]
    async fn test_last_updated_at() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        assert!(repo.last_updated_at().await.unwrap().is_none());

        let (article, _) = repo.upsert(&record("a", 0)).await.unwrap();
        assert_eq!(repo.last_updated_at().await.unwrap(), Some(article.updated_at));
    }

    #[tokio::test]
    async fn test_delete_article() {
        let db = setup_db().await;
        let repo = ArticleRepository::new(db.pool());

        let (article, _) = repo.upsert(&record("a", 0)).await.unwrap();
        assert!(repo.delete(article.id).await.unwrap());
        assert!(repo.get_by_id(article.id).await.unwrap().is_none());
        assert!(!repo.delete(article.id).await.unwrap());
    }
}
