//! Remote annotation service contract

use async_trait::async_trait;

use crate::bookmarks::{BookmarkRecord, ReadingPosition};
use crate::error::SyncResult;

/// Bookmarks fetched for one book
#[derive(Debug, Clone, Default)]
pub struct RemoteBookmarks {
    pub records: Vec<BookmarkRecord>,
    /// Server items that could not be parsed and were dropped
    pub malformed: usize,
}

impl RemoteBookmarks {
    pub fn new(records: Vec<BookmarkRecord>) -> Self {
        Self {
            records,
            malformed: 0,
        }
    }
}

/// Server-side store of bookmarks and reading positions.
///
/// Transport-level retries belong to implementations; callers see a single
/// result per call.
#[async_trait]
pub trait RemoteAnnotationService: Send + Sync {
    /// List the bookmarks stored for a book
    async fn fetch_bookmarks(&self, book_id: &str) -> SyncResult<RemoteBookmarks>;

    /// Upload a bookmark, returning the annotation ID the server assigned
    async fn upload_bookmark(&self, book_id: &str, record: &BookmarkRecord) -> SyncResult<String>;

    /// Delete a bookmark by annotation ID
    async fn delete_bookmark(&self, book_id: &str, annotation_id: &str) -> SyncResult<()>;

    /// The latest reading position stored for a book
    async fn fetch_reading_position(&self, book_id: &str) -> SyncResult<Option<ReadingPosition>>;

    async fn post_reading_position(
        &self,
        book_id: &str,
        position: &ReadingPosition,
    ) -> SyncResult<()>;
}
