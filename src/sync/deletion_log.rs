//! Tombstones for locally deleted bookmarks
//!
//! A tombstone keeps a deleted bookmark from being re-added by a sync pass
//! while the server still lists it. It is removed once the server confirms
//! the delete or when the book's tracking state is cleared. A tombstone past
//! the retention period is dropped only once the server stops listing it.

use std::collections::HashSet;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::error::SyncResult;

/// Durable per-book tombstone set
#[derive(Clone)]
pub struct DeletionLog {
    pool: SqlitePool,
}

impl DeletionLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that `annotation_id` was deleted locally
    pub async fn log_deletion(&self, annotation_id: &str, book_id: &str) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookmark_tombstones (book_id, annotation_id, deleted_at)
            VALUES (?, ?, ?)
            ON CONFLICT(book_id, annotation_id) DO NOTHING
            "#,
        )
        .bind(book_id)
        .bind(annotation_id)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        tracing::debug!(book_id, annotation_id, "Logged bookmark deletion");
        Ok(())
    }

    pub async fn is_deleted(&self, annotation_id: &str, book_id: &str) -> SyncResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM bookmark_tombstones WHERE book_id = ? AND annotation_id = ?",
        )
        .bind(book_id)
        .bind(annotation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// All tombstoned annotation IDs of a book
    pub async fn pending_deletions(&self, book_id: &str) -> SyncResult<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT annotation_id FROM bookmark_tombstones WHERE book_id = ?")
                .bind(book_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Drop one tombstone after the server confirmed the delete
    pub async fn clear_deletion(&self, annotation_id: &str, book_id: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM bookmark_tombstones WHERE book_id = ? AND annotation_id = ?")
            .bind(book_id)
            .bind(annotation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn clear_all(&self, book_id: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM bookmark_tombstones WHERE book_id = ?")
            .bind(book_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Tombstones of a book recorded before `cutoff`
    pub async fn recorded_before(
        &self,
        book_id: &str,
        cutoff: DateTime<Utc>,
    ) -> SyncResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT annotation_id FROM bookmark_tombstones WHERE book_id = ? AND deleted_at < ?",
        )
        .bind(book_id)
        .bind(timestamp(cutoff))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Tombstones of a book older than `retention_days`
    pub async fn expired(&self, book_id: &str, retention_days: i64) -> SyncResult<HashSet<String>> {
        self.recorded_before(book_id, Utc::now() - Duration::days(retention_days))
            .await
    }
}

/// Fixed-width UTC timestamps so stored values compare as strings
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
