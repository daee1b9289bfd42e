//! Local on-device registry of bookmarks and reading positions

mod store;

use async_trait::async_trait;

use crate::bookmarks::{BookmarkRecord, ReadingPosition};
use crate::error::SyncResult;

pub use store::SqliteRegistry;

/// Per-book local state. Every write is atomic for its book.
#[async_trait]
pub trait LocalRegistry: Send + Sync {
    async fn get_bookmarks(&self, book_id: &str) -> SyncResult<Vec<BookmarkRecord>>;

    /// Replace the book's bookmark list
    async fn set_bookmarks(&self, book_id: &str, records: &[BookmarkRecord]) -> SyncResult<()>;

    async fn get_reading_position(&self, book_id: &str) -> SyncResult<Option<ReadingPosition>>;

    /// Replace or remove the book's reading position
    async fn set_reading_position(
        &self,
        book_id: &str,
        position: Option<&ReadingPosition>,
    ) -> SyncResult<()>;

    /// Forget bookmarks and position for a returned book
    async fn clear_tracking_state(&self, book_id: &str) -> SyncResult<()>;
}
