//! Bookmark record types

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::LocationAnchor;

/// A located, timestamped, device-tagged bookmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    /// Server annotation ID, present once the record has been uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_id: Option<String>,
    pub location: LocationAnchor,
    pub created_at: DateTime<Utc>,
    /// Device that created the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
}

/// The single "last read position" of a book.
///
/// Same shape as a bookmark, but at most one exists per book and it is
/// always replaced wholesale.
pub type ReadingPosition = BookmarkRecord;

impl BookmarkRecord {
    /// Create a new local record at `location`, stamped now
    pub fn new(location: LocationAnchor, device_id: Option<&str>) -> Self {
        Self {
            annotation_id: None,
            chapter_title: location.chapter_title().map(str::to_string),
            location,
            created_at: Utc::now(),
            device_id: normalize(device_id.map(str::to_string)),
        }
    }

    /// Set the server annotation ID (empty IDs are treated as absent)
    pub fn with_annotation_id(mut self, annotation_id: &str) -> Self {
        self.annotation_id = normalize(Some(annotation_id.to_string()));
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_device(mut self, device_id: &str) -> Self {
        self.device_id = normalize(Some(device_id.to_string()));
        self
    }

    /// Whether the server has confirmed this record
    pub fn is_synced(&self) -> bool {
        self.annotation_id.is_some()
    }

    /// Identity rule used for dedup and merge.
    ///
    /// Two records with annotation IDs are the same iff the IDs are equal.
    /// Otherwise they are the same iff their locations match.
    pub fn is_same_record(&self, other: &BookmarkRecord) -> bool {
        match (&self.annotation_id, &other.annotation_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.location.matches(&other.location),
        }
    }

    /// Whether this record was created on `device_id`
    pub fn is_from_device(&self, device_id: Option<&str>) -> bool {
        match (self.device_id.as_deref(), device_id) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }
}

/// Display order: text by progress through the book, audio by track and
/// offset, then creation time.
///
/// Each variant uses one key only, so anchors with and without an optional
/// book progression still sort consistently. Text sorts before audio.
pub fn display_order(a: &BookmarkRecord, b: &BookmarkRecord) -> Ordering {
    let by_location = match (&a.location, &b.location) {
        (LocationAnchor::Text(x), LocationAnchor::Text(y)) => {
            x.progress_within_book.total_cmp(&y.progress_within_book)
        }
        (LocationAnchor::Audio(x), LocationAnchor::Audio(y)) => x
            .track_index
            .cmp(&y.track_index)
            .then(x.offset_millis.cmp(&y.offset_millis)),
        (LocationAnchor::Text(_), LocationAnchor::Audio(_)) => Ordering::Less,
        (LocationAnchor::Audio(_), LocationAnchor::Text(_)) => Ordering::Greater,
    };

    by_location.then(a.created_at.cmp(&b.created_at))
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{AudioLocation, TextLocation};
    use chrono::Duration;

    fn text(progress: f64) -> LocationAnchor {
        LocationAnchor::Text(TextLocation::new("/ch1.xhtml", progress, progress))
    }

    #[test]
    fn test_identity_prefers_annotation_ids() {
        let a = BookmarkRecord::new(text(0.1), None).with_annotation_id("a1");
        let moved = BookmarkRecord::new(text(0.2), None).with_annotation_id("a1");
        assert!(a.is_same_record(&moved));

        let same_place = BookmarkRecord::new(text(0.1), None).with_annotation_id("a2");
        assert!(!a.is_same_record(&same_place));
    }

    #[test]
    fn test_identity_falls_back_to_location() {
        let synced = BookmarkRecord::new(text(0.3), None).with_annotation_id("a1");
        let unsynced = BookmarkRecord::new(text(0.30001), None);
        assert!(synced.is_same_record(&unsynced));
        assert!(!unsynced.is_same_record(&BookmarkRecord::new(text(0.5), None)));
    }

    #[test]
    fn test_empty_identifiers_are_absent() {
        let record = BookmarkRecord::new(text(0.1), Some("")).with_annotation_id("");
        assert!(record.annotation_id.is_none());
        assert!(record.device_id.is_none());
        assert!(!record.is_from_device(None));
    }

    #[test]
    fn test_display_order() {
        let now = Utc::now();
        let late = BookmarkRecord::new(text(0.5), None).with_created_at(now);
        let early_tie = BookmarkRecord::new(text(0.5), None).with_created_at(now - Duration::seconds(5));
        let first = BookmarkRecord::new(text(0.1), None).with_created_at(now);

        let mut records = vec![late.clone(), first.clone(), early_tie.clone()];
        records.sort_by(display_order);
        assert_eq!(records, vec![first, early_tie, late]);
    }

    #[test]
    fn test_audio_display_order_without_progress() {
        let a = BookmarkRecord::new(
            LocationAnchor::Audio(AudioLocation::new("urn:track:2", 2, 10)),
            None,
        );
        let b = BookmarkRecord::new(
            LocationAnchor::Audio(AudioLocation::new("urn:track:1", 1, 9_000)),
            None,
        );
        assert_eq!(display_order(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_audio_order_ignores_optional_progress() {
        let audio = |track: i64, progress: Option<f64>| {
            let location = AudioLocation::new(&format!("urn:track:{}", track), track, 0);
            let location = match progress {
                Some(p) => location.with_progress(p),
                None => location,
            };
            BookmarkRecord::new(LocationAnchor::Audio(location), None)
        };
        let a = audio(1, Some(0.9));
        let b = audio(2, None);
        let c = audio(3, Some(0.1));

        assert_eq!(display_order(&a, &b), Ordering::Less);
        assert_eq!(display_order(&b, &c), Ordering::Less);
        assert_eq!(display_order(&a, &c), Ordering::Less);
    }

    #[test]
    fn test_text_sorts_before_audio() {
        let page = BookmarkRecord::new(text(0.9), None);
        let track = BookmarkRecord::new(
            LocationAnchor::Audio(AudioLocation::new("urn:track:0", 0, 0).with_progress(0.0)),
            None,
        );
        assert_eq!(display_order(&page, &track), Ordering::Less);
        assert_eq!(display_order(&track, &page), Ordering::Greater);
    }

    #[test]
    fn test_chapter_title_taken_from_text_anchor() {
        let anchor = LocationAnchor::Text(
            TextLocation::new("/ch4.xhtml", 0.0, 0.6).with_chapter_title("Four"),
        );
        let record = BookmarkRecord::new(anchor, Some("device-1"));
        assert_eq!(record.chapter_title.as_deref(), Some("Four"));
        assert!(record.is_from_device(Some("device-1")));
    }
}
