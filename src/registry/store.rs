//! SQLite-backed registry
//!
//! Records are stored as JSON documents; the book ID is the only key.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::LocalRegistry;
use crate::bookmarks::{BookmarkRecord, ReadingPosition};
use crate::error::SyncResult;

/// Registry persisted in the sync database
#[derive(Clone)]
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocalRegistry for SqliteRegistry {
    async fn get_bookmarks(&self, book_id: &str) -> SyncResult<Vec<BookmarkRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT record_json
            FROM bookmarks
            WHERE book_id = ?
            ORDER BY ordinal ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    async fn set_bookmarks(&self, book_id: &str, records: &[BookmarkRecord]) -> SyncResult<()> {
        let documents = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM bookmarks WHERE book_id = ?")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        for (ordinal, document) in documents.iter().enumerate() {
            sqlx::query("INSERT INTO bookmarks (book_id, ordinal, record_json) VALUES (?, ?, ?)")
                .bind(book_id)
                .bind(ordinal as i64)
                .bind(document)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn get_reading_position(&self, book_id: &str) -> SyncResult<Option<ReadingPosition>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT record_json FROM reading_positions WHERE book_id = ?",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_record()).transpose()
    }

    async fn set_reading_position(
        &self,
        book_id: &str,
        position: Option<&ReadingPosition>,
    ) -> SyncResult<()> {
        match position {
            Some(position) => {
                sqlx::query(
                    r#"
                    INSERT INTO reading_positions (book_id, record_json, updated_at)
                    VALUES (?, ?, datetime('now'))
                    ON CONFLICT(book_id) DO UPDATE SET
                        record_json = excluded.record_json,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(book_id)
                .bind(serde_json::to_string(position)?)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM reading_positions WHERE book_id = ?")
                    .bind(book_id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    async fn clear_tracking_state(&self, book_id: &str) -> SyncResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM bookmarks WHERE book_id = ?")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM reading_positions WHERE book_id = ?")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    record_json: String,
}

impl RecordRow {
    fn into_record(self) -> SyncResult<BookmarkRecord> {
        Ok(serde_json::from_str(&self.record_json)?)
    }
}
