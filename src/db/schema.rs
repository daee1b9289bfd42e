//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::SyncResult;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> SyncResult<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Bookmark list per book, kept in display order
CREATE TABLE IF NOT EXISTS bookmarks (
    book_id TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    record_json TEXT NOT NULL,
    PRIMARY KEY (book_id, ordinal)
);

-- Last read position per book
CREATE TABLE IF NOT EXISTS reading_positions (
    book_id TEXT PRIMARY KEY,
    record_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Deleted bookmarks not yet confirmed gone on the server
CREATE TABLE IF NOT EXISTS bookmark_tombstones (
    book_id TEXT NOT NULL,
    annotation_id TEXT NOT NULL,
    deleted_at TEXT NOT NULL,
    PRIMARY KEY (book_id, annotation_id)
);

CREATE INDEX IF NOT EXISTS idx_bookmark_tombstones_deleted_at ON bookmark_tombstones(deleted_at);
"#;
