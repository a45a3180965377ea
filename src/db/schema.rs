//! Database schema and migrations for devnews.
//!
//! Migrations are applied in order when the database is opened; the
//! schema_version table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Articles table
    r#"
CREATE TABLE articles (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    title           TEXT NOT NULL,
    url             TEXT NOT NULL,
    published_at    TEXT NOT NULL,
    description     TEXT,
    external_id     TEXT NOT NULL,
    source_type     TEXT NOT NULL,
    score           INTEGER NOT NULL DEFAULT 0,
    comment_count   INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_articles_dedup_key ON articles(external_id, source_type);
CREATE INDEX idx_articles_published_at ON articles(published_at);
CREATE INDEX idx_articles_source_type ON articles(source_type);
"#,
    // v2: Bookmarks
    r#"
CREATE TABLE bookmarks (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id      INTEGER NOT NULL UNIQUE REFERENCES articles(id) ON DELETE CASCADE,
    bookmarked_at   TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX idx_bookmarks_bookmarked_at ON bookmarks(bookmarked_at);
"#,
    // v3: Read marks
    r#"
CREATE TABLE read_marks (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id      INTEGER NOT NULL UNIQUE REFERENCES articles(id) ON DELETE CASCADE,
    read_at         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX idx_read_marks_read_at ON read_marks(read_at);
"#,
    // v4: Dismissals
    r#"
CREATE TABLE dismissals (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id      INTEGER NOT NULL UNIQUE REFERENCES articles(id) ON DELETE CASCADE,
    dismissed_at    TEXT NOT NULL,
    permanent       INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE INDEX idx_dismissals_dismissed_at ON dismissals(dismissed_at);
CREATE INDEX idx_dismissals_permanent ON dismissals(permanent);
"#,
];
