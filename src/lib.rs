//! Los Libros Sync
//!
//! Bookmark and reading position synchronization between a reader's local
//! registry and a library's annotation service, across devices and across
//! text and audio content.

pub mod annotations;
pub mod bookmarks;
pub mod config;
pub mod db;
pub mod error;
pub mod location;
pub mod registry;
pub mod routes;
pub mod state;
pub mod sync;

pub use bookmarks::{BookmarkReconciler, BookmarkRecord, ReadingPosition};
pub use error::{AppError, SyncError, SyncResult};
pub use location::{approximately_equal, LocationAnchor, PROGRESS_EPSILON};
pub use sync::{DeletionLog, PositionReconciler, SyncOrchestrator};
