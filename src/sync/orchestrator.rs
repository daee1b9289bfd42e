//! SyncOrchestrator: drives reconciliation passes per book
//!
//! A pass runs `uploadingNew -> fetchingRemote -> reconciling ->
//! writingLocal -> uploadingDeletes` against the local registry and the
//! annotation service. At most one pass per book is in flight; a second
//! trigger returns at once with a coalesced outcome.
//!
//! Registry writes for a book happen under that book's write lock. A pass
//! re-reads the registry before writing so that bookmarks created or deleted
//! while it was waiting on the network are not lost. Returning a book bumps
//! its generation, and a pass that started under an older generation drops
//! its results.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;

use super::deletion_log::DeletionLog;
use super::position::{PositionDecision, PositionReconciler};
use super::poster::ReadingPositionPoster;
use super::types::{DeleteOutcome, SyncOutcome, SyncPhase, SyncSettings};
use crate::annotations::{RemoteAnnotationService, RemoteBookmarks};
use crate::bookmarks::{display_order, BookmarkReconciler, BookmarkRecord, ReadingPosition};
use crate::error::{SyncError, SyncResult};
use crate::location::LocationAnchor;
use crate::registry::LocalRegistry;

type BookLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Sync engine entry point for the reader
pub struct SyncOrchestrator {
    registry: Arc<dyn LocalRegistry>,
    remote: Arc<dyn RemoteAnnotationService>,
    deletion_log: DeletionLog,
    settings: SyncSettings,
    poster: ReadingPositionPoster,
    passes: Mutex<HashMap<String, SyncPhase>>,
    generations: Mutex<HashMap<String, u64>>,
    book_locks: BookLocks,
}

/// Marks a book's pass as in flight until dropped
struct PassGuard<'a> {
    passes: &'a Mutex<HashMap<String, SyncPhase>>,
    book_id: String,
}

impl PassGuard<'_> {
    fn set(&self, phase: SyncPhase) {
        if let Some(current) = self.passes.lock().get_mut(&self.book_id) {
            *current = phase;
        }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.passes.lock().remove(&self.book_id);
    }
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<dyn LocalRegistry>,
        remote: Arc<dyn RemoteAnnotationService>,
        deletion_log: DeletionLog,
        settings: SyncSettings,
    ) -> Self {
        let poster = ReadingPositionPoster::new(remote.clone(), settings.position_post_interval);
        Self {
            registry,
            remote,
            deletion_log,
            settings,
            poster,
            passes: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            book_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn deletion_log(&self) -> &DeletionLog {
        &self.deletion_log
    }

    pub fn poster(&self) -> &ReadingPositionPoster {
        &self.poster
    }

    /// Current phase of the book's pass, `Idle` when none is running
    pub fn phase(&self, book_id: &str) -> SyncPhase {
        self.passes
            .lock()
            .get(book_id)
            .copied()
            .unwrap_or(SyncPhase::Idle)
    }

    pub async fn bookmarks(&self, book_id: &str) -> SyncResult<Vec<BookmarkRecord>> {
        self.registry.get_bookmarks(book_id).await
    }

    pub async fn reading_position(&self, book_id: &str) -> SyncResult<Option<ReadingPosition>> {
        self.registry.get_reading_position(book_id).await
    }

    /// Run one reconciliation pass for a book
    pub async fn synchronize(&self, book_id: &str) -> SyncResult<SyncOutcome> {
        let Some(pass) = self.begin_pass(book_id, SyncPhase::UploadingNew) else {
            tracing::debug!(book_id, "Sync already in flight, coalescing");
            return Ok(SyncOutcome::coalesced());
        };
        if !self.settings.enabled {
            return Ok(SyncOutcome::default());
        }

        let generation = self.generation(book_id);

        // Local records the server has never seen go up first
        let (local, failed_uploads) = match self.upload_unsynced(book_id, generation).await? {
            Some(uploaded) => uploaded,
            None => return Ok(self.discard(book_id)),
        };

        pass.set(SyncPhase::FetchingRemote);
        let remote = match self.remote.fetch_bookmarks(book_id).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(book_id, "Fetching remote bookmarks failed: {}", e);
                return Err(e);
            }
        };
        let remote_position = match self.remote.fetch_reading_position(book_id).await {
            Ok(position) => position,
            Err(e) => {
                tracing::warn!(book_id, "Fetching remote reading position failed: {}", e);
                None
            }
        };

        pass.set(SyncPhase::Reconciling);
        let RemoteBookmarks { records, malformed } = remote;
        if let Err(e) = self.prune_tombstones(book_id, &records).await {
            tracing::warn!(book_id, "Failed to prune bookmark tombstones: {}", e);
        }
        let tombstones = self.deletion_log.pending_deletions(book_id).await?;
        let device_id = self.settings.device_id.as_deref();
        let reconciliation = BookmarkReconciler::new(device_id).reconcile(
            &local,
            &records,
            &failed_uploads,
            &tombstones,
        );

        pass.set(SyncPhase::WritingLocal);
        let lock = self.book_lock(book_id);
        let (restored_position, position_prompt, tombstones) = {
            let _write = lock.lock().await;
            if self.generation(book_id) != generation {
                return Ok(self.discard(book_id));
            }

            let current = self.registry.get_bookmarks(book_id).await?;
            let tombstones = self.deletion_log.pending_deletions(book_id).await?;
            let next_local = rebase(reconciliation.next_local, &local, &current, &tombstones);
            self.registry.set_bookmarks(book_id, &next_local).await?;

            let local_position = self.registry.get_reading_position(book_id).await?;
            let decision = PositionReconciler::new(device_id)
                .resolve(local_position.as_ref(), remote_position.as_ref());
            match decision {
                PositionDecision::Keep => (None, None, tombstones),
                PositionDecision::Prompt(position) => (None, Some(position), tombstones),
                PositionDecision::Restore(position) => {
                    self.registry
                        .set_reading_position(book_id, Some(&position))
                        .await?;
                    (Some(position), None, tombstones)
                }
            }
        };

        pass.set(SyncPhase::UploadingDeletes);
        // Pending tombstones are retried too; a 404 confirms them
        let deletes: BTreeSet<String> = reconciliation
            .remote_deletes
            .iter()
            .cloned()
            .chain(tombstones)
            .collect();
        let failed_deletes = self.issue_deletes(book_id, &deletes, generation).await;

        let outcome = SyncOutcome {
            new_bookmark_count: reconciliation.added_from_remote,
            position_prompt,
            restored_position,
            coalesced: false,
            discarded: false,
            failed_uploads: failed_uploads.len(),
            failed_deletes,
            malformed: malformed + reconciliation.skipped,
        };
        tracing::info!(
            book_id,
            added = outcome.new_bookmark_count,
            deleted = deletes.len() - failed_deletes,
            failed_uploads = outcome.failed_uploads,
            failed_deletes,
            skipped = outcome.malformed,
            "Sync pass complete"
        );

        Ok(outcome)
    }

    /// Bookmark a location.
    ///
    /// A bookmark already at the same location is returned instead of a new one.
    pub async fn create_bookmark(
        &self,
        book_id: &str,
        location: LocationAnchor,
    ) -> SyncResult<BookmarkRecord> {
        if !location.is_resolvable() {
            return Err(SyncError::UnresolvableLocation);
        }

        let lock = self.book_lock(book_id);
        let record = {
            let _write = lock.lock().await;
            let mut bookmarks = self.registry.get_bookmarks(book_id).await?;
            if let Some(existing) = bookmarks.iter().find(|b| b.location.matches(&location)) {
                return Ok(existing.clone());
            }
            if bookmarks
                .first()
                .is_some_and(|b| !b.location.same_variant(&location))
            {
                return Err(SyncError::UnresolvableLocation);
            }

            let record = BookmarkRecord::new(location, self.settings.device_id.as_deref());
            bookmarks.push(record.clone());
            bookmarks.sort_by(display_order);
            self.registry.set_bookmarks(book_id, &bookmarks).await?;
            record
        };

        if !self.settings.enabled {
            return Ok(record);
        }
        // A running pass would upload it as well; leave it to the next one
        let Some(_pass) = self.begin_pass(book_id, SyncPhase::UploadingNew) else {
            tracing::debug!(book_id, "Sync in flight, deferring bookmark upload");
            return Ok(record);
        };

        let generation = self.generation(book_id);
        let annotation_id = match self.remote.upload_bookmark(book_id, &record).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(book_id, "Bookmark upload failed, will retry on next sync: {}", e);
                return Ok(record);
            }
        };

        let uploaded = record.with_annotation_id(&annotation_id);
        let _write = lock.lock().await;
        if self.generation(book_id) != generation {
            return Ok(uploaded);
        }
        let mut bookmarks = self.registry.get_bookmarks(book_id).await?;
        if let Some(stored) = bookmarks
            .iter_mut()
            .find(|b| b.annotation_id.is_none() && b.is_same_record(&uploaded))
        {
            stored.annotation_id = Some(annotation_id);
            self.registry.set_bookmarks(book_id, &bookmarks).await?;
        }

        Ok(uploaded)
    }

    /// Delete a bookmark locally and, when it was uploaded, on the server
    pub async fn delete_bookmark(
        &self,
        book_id: &str,
        record: &BookmarkRecord,
    ) -> SyncResult<DeleteOutcome> {
        let lock = self.book_lock(book_id);
        let removed = {
            let _write = lock.lock().await;
            let mut bookmarks = self.registry.get_bookmarks(book_id).await?;
            let Some(index) = bookmarks.iter().position(|b| b.is_same_record(record)) else {
                return Ok(DeleteOutcome::NotFound);
            };
            let removed = bookmarks.remove(index);

            // Tombstone first so a crash between the two writes cannot resurrect it
            if let Some(annotation_id) = &removed.annotation_id {
                self.deletion_log.log_deletion(annotation_id, book_id).await?;
            }
            self.registry.set_bookmarks(book_id, &bookmarks).await?;
            removed
        };

        let Some(annotation_id) = removed.annotation_id else {
            return Ok(DeleteOutcome::LocalOnly);
        };
        if !self.settings.enabled {
            return Ok(DeleteOutcome::LocalOnly);
        }

        match self.remote.delete_bookmark(book_id, &annotation_id).await {
            Ok(()) => {
                self.deletion_log
                    .clear_deletion(&annotation_id, book_id)
                    .await?;
                Ok(DeleteOutcome::Confirmed)
            }
            Err(e) => {
                tracing::warn!(book_id, annotation_id = %annotation_id, "Remote delete failed: {}", e);
                Ok(DeleteOutcome::Pending)
            }
        }
    }

    /// Store a reading heartbeat locally and queue it for the server.
    ///
    /// Returns `None` when the position was ignored.
    pub async fn record_position(
        &self,
        book_id: &str,
        location: LocationAnchor,
    ) -> SyncResult<Option<ReadingPosition>> {
        if ReadingPositionPoster::is_opening_position(&location) {
            return Ok(None);
        }
        if !location.is_resolvable() {
            return Err(SyncError::UnresolvableLocation);
        }

        let position = ReadingPosition::new(location, self.settings.device_id.as_deref());
        self.registry
            .set_reading_position(book_id, Some(&position))
            .await?;

        if self.settings.enabled {
            if let Err(e) = self.poster.store(book_id, position.clone()).await {
                tracing::warn!(book_id, "Posting reading position failed: {}", e);
            }
        }

        Ok(Some(position))
    }

    /// Apply a prompted remote position the reader accepted
    pub async fn accept_position(
        &self,
        book_id: &str,
        position: &ReadingPosition,
    ) -> SyncResult<()> {
        if !position.location.is_resolvable() {
            return Err(SyncError::UnresolvableLocation);
        }
        self.registry
            .set_reading_position(book_id, Some(position))
            .await
    }

    /// Send queued reading positions now
    pub async fn flush_positions(&self) {
        if self.settings.enabled {
            self.poster.flush_all().await;
        }
    }

    /// Forget everything about a returned book.
    ///
    /// Passes still running for it drop their results.
    pub async fn return_book(&self, book_id: &str) -> SyncResult<()> {
        let lock = self.book_lock(book_id);
        let _write = lock.lock().await;

        *self
            .generations
            .lock()
            .entry(book_id.to_string())
            .or_insert(0) += 1;
        self.poster.discard(book_id);
        self.registry.clear_tracking_state(book_id).await?;
        self.deletion_log.clear_all(book_id).await?;

        tracing::info!(book_id, "Cleared tracking state for returned book");
        Ok(())
    }

    fn begin_pass(&self, book_id: &str, phase: SyncPhase) -> Option<PassGuard<'_>> {
        let mut passes = self.passes.lock();
        if passes.contains_key(book_id) {
            return None;
        }
        passes.insert(book_id.to_string(), phase);

        Some(PassGuard {
            passes: &self.passes,
            book_id: book_id.to_string(),
        })
    }

    fn generation(&self, book_id: &str) -> u64 {
        self.generations.lock().get(book_id).copied().unwrap_or(0)
    }

    fn book_lock(&self, book_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.book_locks
            .lock()
            .entry(book_id.to_string())
            .or_default()
            .clone()
    }

    fn discard(&self, book_id: &str) -> SyncOutcome {
        tracing::warn!(book_id, "Book was returned during sync, discarding results");
        SyncOutcome::discarded()
    }

    /// Upload local records without an annotation ID and write acquired IDs
    /// back. Returns the local list as written and the records that failed,
    /// or `None` when the book was returned meanwhile.
    async fn upload_unsynced(
        &self,
        book_id: &str,
        generation: u64,
    ) -> SyncResult<Option<(Vec<BookmarkRecord>, Vec<BookmarkRecord>)>> {
        let unsynced: Vec<BookmarkRecord> = self
            .registry
            .get_bookmarks(book_id)
            .await?
            .into_iter()
            .filter(|b| !b.is_synced())
            .collect();

        let results = join_all(
            unsynced
                .iter()
                .map(|record| self.remote.upload_bookmark(book_id, record)),
        )
        .await;

        let mut acquired = Vec::new();
        let mut failed = Vec::new();
        for (record, result) in unsynced.into_iter().zip(results) {
            match result {
                Ok(annotation_id) => acquired.push(record.with_annotation_id(&annotation_id)),
                Err(e) => {
                    tracing::warn!(book_id, "Bookmark upload failed: {}", e);
                    failed.push(record);
                }
            }
        }

        let lock = self.book_lock(book_id);
        let _write = lock.lock().await;
        if self.generation(book_id) != generation {
            return Ok(None);
        }

        let mut local = self.registry.get_bookmarks(book_id).await?;
        if !acquired.is_empty() {
            for stored in local.iter_mut().filter(|b| !b.is_synced()) {
                if let Some(uploaded) = acquired.iter().find(|u| u.location.matches(&stored.location)) {
                    stored.annotation_id = uploaded.annotation_id.clone();
                }
            }
            self.registry.set_bookmarks(book_id, &local).await?;
        }
        // Records deleted while their upload was in flight are not retried
        failed.retain(|f| local.iter().any(|l| l.is_same_record(f)));

        Ok(Some((local, failed)))
    }

    /// Issue remote deletes in parallel, clearing each confirmed tombstone.
    /// Returns the number of deletes that failed.
    async fn issue_deletes(
        &self,
        book_id: &str,
        annotation_ids: &BTreeSet<String>,
        generation: u64,
    ) -> usize {
        let results = join_all(
            annotation_ids
                .iter()
                .map(|id| self.remote.delete_bookmark(book_id, id)),
        )
        .await;

        let mut failed = 0;
        for (annotation_id, result) in annotation_ids.iter().zip(results) {
            match result {
                Ok(()) => {
                    if self.generation(book_id) != generation {
                        continue;
                    }
                    if let Err(e) = self.deletion_log.clear_deletion(annotation_id, book_id).await {
                        tracing::warn!(book_id, "Failed to clear tombstone {}: {}", annotation_id, e);
                    }
                }
                Err(e) => {
                    tracing::warn!(book_id, annotation_id = %annotation_id, "Remote delete failed: {}", e);
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Drop expired tombstones the server no longer lists. A listed one is
    /// kept however old, since dropping it would let the bookmark return.
    async fn prune_tombstones(&self, book_id: &str, listed: &[BookmarkRecord]) -> SyncResult<()> {
        let expired = self
            .deletion_log
            .expired(book_id, self.settings.tombstone_retention_days)
            .await?;
        if expired.is_empty() {
            return Ok(());
        }

        let listed: HashSet<&str> = listed
            .iter()
            .filter_map(|r| r.annotation_id.as_deref())
            .collect();
        let mut pruned = 0;
        for annotation_id in expired.iter().filter(|id| !listed.contains(id.as_str())) {
            self.deletion_log.clear_deletion(annotation_id, book_id).await?;
            pruned += 1;
        }
        if pruned > 0 {
            tracing::info!(book_id, "Pruned {} expired bookmark tombstones", pruned);
        }
        Ok(())
    }
}

/// Replay local changes made while a pass was on the network onto the
/// reconciled list: records deleted since `snapshot` are dropped, records
/// created since are kept, and tombstoned IDs never come back.
fn rebase(
    reconciled: Vec<BookmarkRecord>,
    snapshot: &[BookmarkRecord],
    current: &[BookmarkRecord],
    tombstones: &HashSet<String>,
) -> Vec<BookmarkRecord> {
    let deleted_meanwhile = |record: &BookmarkRecord| {
        snapshot.iter().any(|s| s.is_same_record(record))
            && !current.iter().any(|c| c.is_same_record(record))
    };
    let created_meanwhile = current
        .iter()
        .filter(|c| !snapshot.iter().any(|s| s.is_same_record(c)));

    let mut next: Vec<BookmarkRecord> = Vec::with_capacity(reconciled.len());
    for record in reconciled.into_iter().chain(created_meanwhile.cloned()) {
        let tombstoned = record
            .annotation_id
            .as_deref()
            .is_some_and(|id| tombstones.contains(id));
        if tombstoned || deleted_meanwhile(&record) {
            continue;
        }
        if next.iter().any(|kept| kept.is_same_record(&record)) {
            continue;
        }
        next.push(record);
    }
    next.sort_by(display_order);
    next
}
