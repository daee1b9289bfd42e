//! Bookmark and position reconciliation rules

mod common;

use std::collections::HashSet;

use chrono::{Duration, Utc};

use common::{remote_bookmark, text, DEVICE, OTHER_DEVICE};
use los_libros_sync::bookmarks::{BookmarkReconciler, BookmarkRecord};
use los_libros_sync::location::{AudioLocation, LocationAnchor};
use los_libros_sync::sync::{PositionReconciler, PositionSource};

fn tombstones(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn mine(progress: f64) -> BookmarkRecord {
    BookmarkRecord::new(text(progress), Some(DEVICE))
}

#[test]
fn remote_bookmark_is_added_to_empty_local_set() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let remote = vec![remote_bookmark(0.1, "a", OTHER_DEVICE)];

    let result = reconciler.reconcile(&[], &remote, &[], &HashSet::new());

    assert_eq!(result.next_local, remote);
    assert!(result.remote_deletes.is_empty());
    assert_eq!(result.added_from_remote, 1);
}

#[test]
fn local_copy_wins_for_same_annotation_id() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let local = vec![mine(0.1).with_annotation_id("a1")];
    let remote = vec![remote_bookmark(0.2, "a1", OTHER_DEVICE)];

    let result = reconciler.reconcile(&local, &remote, &[], &HashSet::new());

    assert_eq!(result.next_local.len(), 1);
    assert_eq!(result.next_local[0].location.progress_within_book(), Some(0.1));
    assert_eq!(result.next_local[0].device_id.as_deref(), Some(DEVICE));
    assert_eq!(result.added_from_remote, 0);
}

#[test]
fn tombstoned_remote_is_dropped_and_deletion_reasserted() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let remote = vec![remote_bookmark(0.3, "x", OTHER_DEVICE)];

    let result = reconciler.reconcile(&[], &remote, &[], &tombstones(&["x"]));

    assert!(result.next_local.is_empty());
    assert_eq!(result.remote_deletes.into_iter().collect::<Vec<_>>(), vec!["x"]);
}

#[test]
fn same_device_orphan_is_deleted_remotely() {
    let reconciler = BookmarkReconciler::new(Some("dev1"));
    let remote = vec![remote_bookmark(0.4, "orphan", "dev1")];

    let result = reconciler.reconcile(&[], &remote, &[], &HashSet::new());

    assert!(result.next_local.is_empty());
    assert!(result.remote_deletes.contains("orphan"));
}

#[test]
fn reconcile_is_idempotent() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let local = vec![mine(0.5).with_annotation_id("mine"), mine(0.7)];
    let remote = vec![
        remote_bookmark(0.5, "mine", DEVICE),
        remote_bookmark(0.2, "theirs", OTHER_DEVICE),
        remote_bookmark(0.9, "other", OTHER_DEVICE),
    ];

    let first = reconciler.reconcile(&local, &remote, &[], &HashSet::new());
    let second = reconciler.reconcile(&first.next_local, &remote, &[], &HashSet::new());

    assert_eq!(second.next_local, first.next_local);
    assert!(second.remote_deletes.is_empty());
    assert_eq!(second.added_from_remote, 0);
}

#[test]
fn tombstoned_records_never_survive_from_any_input() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let local = vec![mine(0.1).with_annotation_id("gone")];
    let failed = vec![mine(0.2).with_annotation_id("gone-too")];
    let remote = vec![remote_bookmark(0.3, "gone", OTHER_DEVICE)];

    let result = reconciler.reconcile(&local, &remote, &failed, &tombstones(&["gone", "gone-too"]));

    assert!(result
        .next_local
        .iter()
        .all(|r| !matches!(r.annotation_id.as_deref(), Some("gone") | Some("gone-too"))));
}

#[test]
fn failed_uploads_are_never_dropped() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let failed = vec![mine(0.25), mine(0.75)];
    let remote = vec![remote_bookmark(0.5, "r", OTHER_DEVICE)];

    // Failed uploads are retained even when missing from the local input
    let result = reconciler.reconcile(&failed[..1], &remote, &failed, &HashSet::new());

    for record in &failed {
        assert!(result.next_local.iter().any(|r| r.is_same_record(record)));
    }
    assert_eq!(result.next_local.len(), 3);
}

#[test]
fn local_only_bookmarks_survive() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let local = vec![mine(0.6).with_annotation_id("only-here")];

    let result = reconciler.reconcile(&local, &[], &[], &HashSet::new());

    assert_eq!(result.next_local, local);
    assert!(result.remote_deletes.is_empty());
}

#[test]
fn unsynced_local_matches_remote_by_location() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let local = vec![mine(0.33)];
    let remote = vec![remote_bookmark(0.33002, "r1", OTHER_DEVICE)];

    let result = reconciler.reconcile(&local, &remote, &[], &HashSet::new());

    assert_eq!(result.next_local.len(), 1);
    assert!(result.next_local[0].annotation_id.is_none());
}

#[test]
fn next_local_is_in_display_order() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let now = Utc::now();
    let local = vec![mine(0.8), mine(0.2).with_created_at(now)];
    let remote = vec![
        remote_bookmark(0.5, "b", OTHER_DEVICE),
        remote_bookmark(0.25, "c", OTHER_DEVICE).with_created_at(now - Duration::minutes(1)),
    ];

    let result = reconciler.reconcile(&local, &remote, &[], &HashSet::new());
    let order: Vec<f64> = result
        .next_local
        .iter()
        .filter_map(|r| r.location.progress_within_book())
        .collect();

    assert_eq!(order, vec![0.2, 0.25, 0.5, 0.8]);
}

#[test]
fn audio_bookmarks_with_and_without_progress_sort_by_track() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    // Progress runs against track order, and every third locator omits it
    let remote: Vec<BookmarkRecord> = (0..200i64)
        .map(|i| {
            let location = AudioLocation::new(&format!("urn:track:{}", i), i, (i % 7) * 1_000);
            let location = if i % 3 == 0 {
                location
            } else {
                location.with_progress(1.0 - i as f64 / 200.0)
            };
            BookmarkRecord::new(LocationAnchor::Audio(location), Some(OTHER_DEVICE))
                .with_annotation_id(&format!("track-{}", i))
        })
        .rev()
        .collect();

    let result = reconciler.reconcile(&[], &remote, &[], &HashSet::new());

    assert_eq!(result.next_local.len(), 200);
    let tracks: Vec<i64> = result
        .next_local
        .iter()
        .map(|r| match &r.location {
            LocationAnchor::Audio(audio) => audio.track_index,
            LocationAnchor::Text(_) => -1,
        })
        .collect();
    assert_eq!(tracks, (0..200).collect::<Vec<_>>());
}

#[test]
fn tombstone_wins_over_unlocatable_remote() {
    let reconciler = BookmarkReconciler::new(Some(DEVICE));
    let local = vec![mine(0.1)];
    let remote = vec![BookmarkRecord::new(common::audio(2, 300), Some(OTHER_DEVICE))
        .with_annotation_id("deleted-audio")];

    let result = reconciler.reconcile(&local, &remote, &[], &tombstones(&["deleted-audio"]));

    assert!(result.remote_deletes.contains("deleted-audio"));
    assert_eq!(result.skipped, 0);
    assert_eq!(result.next_local.len(), 1);
}

#[test]
fn same_device_position_is_not_adopted_even_if_newer() {
    let reconciler = PositionReconciler::new(Some(DEVICE));
    let local = BookmarkRecord::new(text(0.1), Some(DEVICE));
    let server = BookmarkRecord::new(text(0.9), Some(DEVICE))
        .with_created_at(Utc::now() + Duration::days(1));

    assert!(!reconciler.should_adopt_remote(Some(&server), Some(&local)));
}

#[test]
fn other_device_position_is_adopted() {
    let reconciler = PositionReconciler::new(Some(DEVICE));
    let local = BookmarkRecord::new(text(0.1), Some(DEVICE));
    let server = BookmarkRecord::new(text(0.9), Some(OTHER_DEVICE))
        .with_created_at(Utc::now() - Duration::days(1));

    assert!(reconciler.should_adopt_remote(Some(&server), Some(&local)));
}

#[test]
fn timestamp_tie_keeps_local_position() {
    let at = Utc::now();
    let local = BookmarkRecord::new(common::audio(1, 1_000), Some(DEVICE)).with_created_at(at);
    let remote = BookmarkRecord::new(common::audio(3, 9_000), Some(OTHER_DEVICE)).with_created_at(at);

    let (source, winner) = PositionReconciler::latest(Some(&local), Some(&remote)).unwrap();

    assert_eq!(source, PositionSource::Local);
    assert_eq!(winner, &local);
}
