//! Bookmark reconciliation
//!
//! Merges the local bookmark list with the server's copy. The merge is a
//! pure function of its inputs: writing the result back and issuing the
//! remote deletes is left to the caller.
//!
//! Rules, per remote record:
//! 1. tombstoned locally: dropped, deletion re-asserted on the server
//! 2. matches a local record: the local copy is kept
//! 3. created on this device but unknown locally: orphan, deleted remotely
//! 4. otherwise: added as a newly discovered bookmark
//!
//! Local-only records and previous upload failures always survive.

use std::collections::{BTreeSet, HashSet};

use super::types::{display_order, BookmarkRecord};

/// Result of one reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// The next local bookmark list, deduplicated and in display order
    pub next_local: Vec<BookmarkRecord>,
    /// Annotation IDs to delete on the server
    pub remote_deletes: BTreeSet<String>,
    /// Remote bookmarks that were not known locally
    pub added_from_remote: usize,
    /// Remote records ignored because they cannot be located in this book
    pub skipped: usize,
}

/// Reconciles local and remote bookmark sets for one device
#[derive(Debug, Clone, Default)]
pub struct BookmarkReconciler {
    local_device_id: Option<String>,
}

impl BookmarkReconciler {
    pub fn new(local_device_id: Option<&str>) -> Self {
        Self {
            local_device_id: local_device_id
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    pub fn reconcile(
        &self,
        local: &[BookmarkRecord],
        remote: &[BookmarkRecord],
        failed_uploads: &[BookmarkRecord],
        tombstones: &HashSet<String>,
    ) -> Reconciliation {
        let mut remote_deletes = BTreeSet::new();
        let mut discovered: Vec<BookmarkRecord> = Vec::new();
        let mut skipped = 0;

        // Every anchor of a book uses the same variant; the local set decides it
        let book_variant = local.first().or_else(|| failed_uploads.first());

        for record in remote {
            if let Some(id) = record.annotation_id.as_deref() {
                if tombstones.contains(id) {
                    tracing::debug!("Blocking deleted bookmark from reappearing: {}", id);
                    remote_deletes.insert(id.to_string());
                    continue;
                }
            }

            if !record.location.is_resolvable()
                || book_variant.is_some_and(|known| !known.location.same_variant(&record.location))
            {
                tracing::debug!("Skipping unlocatable remote bookmark: {:?}", record.annotation_id);
                skipped += 1;
                continue;
            }

            if local.iter().any(|l| l.is_same_record(record)) {
                continue;
            }

            if discovered.iter().any(|d| d.is_same_record(record)) {
                continue;
            }

            if record.is_from_device(self.local_device_id.as_deref()) {
                match &record.annotation_id {
                    Some(id) => {
                        tracing::debug!("Removing orphaned bookmark from this device: {}", id);
                        remote_deletes.insert(id.clone());
                    }
                    None => skipped += 1,
                }
                continue;
            }

            discovered.push(record.clone());
        }

        let added_from_remote = discovered.len();

        let mut next_local: Vec<BookmarkRecord> = Vec::with_capacity(local.len() + discovered.len());
        for record in local.iter().chain(discovered.iter()).chain(failed_uploads.iter()) {
            let tombstoned = record
                .annotation_id
                .as_deref()
                .is_some_and(|id| tombstones.contains(id));
            if tombstoned || !record.location.is_resolvable() {
                continue;
            }
            if next_local.iter().any(|kept| kept.is_same_record(record)) {
                continue;
            }
            next_local.push(record.clone());
        }
        next_local.sort_by(display_order);

        Reconciliation {
            next_local,
            remote_deletes,
            added_from_remote,
            skipped,
        }
    }
}
