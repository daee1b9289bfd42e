//! Bookmarks and reading positions
//!
//! Record types, the identity rule and the local/remote merge.

mod reconciler;
mod types;

pub use reconciler::{BookmarkReconciler, Reconciliation};
pub use types::{display_order, BookmarkRecord, ReadingPosition};
