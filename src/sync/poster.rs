//! Throttled reading position uploads
//!
//! Readers report positions far more often than the server should hear
//! about them. The poster sends at most one position per book per interval
//! and keeps only the latest unsent one, which `flush` sends right away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::annotations::RemoteAnnotationService;
use crate::bookmarks::ReadingPosition;
use crate::error::SyncResult;
use crate::location::LocationAnchor;

#[derive(Default)]
struct PosterSlot {
    last_post: Option<Instant>,
    queued: Option<ReadingPosition>,
}

/// Per-book throttle in front of `post_reading_position`
pub struct ReadingPositionPoster {
    remote: Arc<dyn RemoteAnnotationService>,
    interval: Duration,
    slots: Mutex<HashMap<String, PosterSlot>>,
}

impl ReadingPositionPoster {
    pub fn new(remote: Arc<dyn RemoteAnnotationService>, interval: Duration) -> Self {
        Self {
            remote,
            interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Readers report the very start of a text book while they are still
    /// opening it; such positions must not overwrite real progress.
    pub fn is_opening_position(anchor: &LocationAnchor) -> bool {
        matches!(anchor, LocationAnchor::Text(text) if text.progress_within_book == 0.0)
    }

    /// Queue a position and post it if the book's interval has elapsed.
    ///
    /// Returns whether a post was made.
    pub async fn store(&self, book_id: &str, position: ReadingPosition) -> SyncResult<bool> {
        let due = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(book_id.to_string()).or_default();
            slot.queued = Some(position);

            let ready = slot
                .last_post
                .map_or(true, |last| last.elapsed() >= self.interval);
            if ready {
                slot.last_post = Some(Instant::now());
                slot.queued.take()
            } else {
                None
            }
        };

        match due {
            Some(position) => self.post(book_id, position).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Post the queued position for a book, if any, regardless of the interval
    pub async fn flush(&self, book_id: &str) -> SyncResult<bool> {
        let queued = {
            let mut slots = self.slots.lock();
            slots.get_mut(book_id).and_then(|slot| {
                let queued = slot.queued.take();
                if queued.is_some() {
                    slot.last_post = Some(Instant::now());
                }
                queued
            })
        };

        match queued {
            Some(position) => self.post(book_id, position).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Flush every book; failures are logged and skipped
    pub async fn flush_all(&self) {
        let books: Vec<String> = self.slots.lock().keys().cloned().collect();
        for book_id in books {
            if let Err(e) = self.flush(&book_id).await {
                tracing::warn!(book_id = %book_id, "Failed to flush reading position: {}", e);
            }
        }
    }

    /// Whether a position is waiting to be sent
    pub fn has_queued(&self, book_id: &str) -> bool {
        self.slots
            .lock()
            .get(book_id)
            .is_some_and(|slot| slot.queued.is_some())
    }

    /// Forget a returned book
    pub fn discard(&self, book_id: &str) {
        self.slots.lock().remove(book_id);
    }

    async fn post(&self, book_id: &str, position: ReadingPosition) -> SyncResult<()> {
        tracing::debug!(book_id, "Posting reading position");
        if let Err(e) = self.remote.post_reading_position(book_id, &position).await {
            // Keep it for the next attempt unless something newer arrived
            let mut slots = self.slots.lock();
            let slot = slots.entry(book_id.to_string()).or_default();
            if slot.queued.is_none() {
                slot.queued = Some(position);
            }
            return Err(e);
        }
        Ok(())
    }
}
