//! Sync engine
//!
//! Keeps bookmarks and the last read position of each book in step with the
//! annotation service:
//!
//! - `DeletionLog`: tombstones that stop deleted bookmarks from reappearing
//! - `PositionReconciler`: device- and timestamp-authority position rules
//! - `ReadingPositionPoster`: throttled position uploads
//! - `SyncOrchestrator`: per-book passes, coalescing and cancellation

mod deletion_log;
mod orchestrator;
mod position;
mod poster;
mod types;

pub use deletion_log::DeletionLog;
pub use orchestrator::SyncOrchestrator;
pub use position::{PositionDecision, PositionReconciler, PositionSource, PositionStrategy};
pub use poster::ReadingPositionPoster;
pub use types::{DeleteOutcome, SyncOutcome, SyncPhase, SyncSettings};
