//! Content locations
//!
//! A `LocationAnchor` answers "where in the content" for both paginated text
//! and timed audio. Anchors compare approximately on progress fields so that
//! values which went through a JSON round-trip still match.

mod locator;

use serde::{Deserialize, Serialize};

pub use locator::{LocatorError, AUDIO_LOCATOR_TYPE, LEGACY_LOCATOR_TYPE, TEXT_LOCATOR_TYPE};

/// Tolerance used wherever identity depends on a progress value
pub const PROGRESS_EPSILON: f64 = 1e-4;

/// Near-equality for progress values
pub fn approximately_equal(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon
}

/// Where in a book a bookmark or reading position points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LocationAnchor {
    /// Paginated text (EPUB)
    Text(TextLocation),
    /// Timed audio (audiobook)
    Audio(AudioLocation),
}

/// Position inside a reflowable text publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLocation {
    /// Spine item href
    pub href: String,
    /// Progression inside the chapter (0.0-1.0)
    pub progress_within_chapter: f64,
    /// Progression inside the whole book (0.0-1.0)
    pub progress_within_book: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_label: Option<String>,
}

/// Position inside an audiobook track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLocation {
    /// Reading-order item key of the track
    pub track_identifier: String,
    pub track_index: i64,
    pub offset_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_within_book: Option<f64>,
}

impl TextLocation {
    pub fn new(href: &str, progress_within_chapter: f64, progress_within_book: f64) -> Self {
        Self {
            href: href.to_string(),
            progress_within_chapter,
            progress_within_book,
            chapter_title: None,
            page_label: None,
        }
    }

    pub fn with_chapter_title(mut self, title: &str) -> Self {
        self.chapter_title = Some(title.to_string());
        self
    }

    pub fn with_page_label(mut self, label: &str) -> Self {
        self.page_label = Some(label.to_string());
        self
    }
}

impl AudioLocation {
    pub fn new(track_identifier: &str, track_index: i64, offset_millis: i64) -> Self {
        Self {
            track_identifier: track_identifier.to_string(),
            track_index,
            offset_millis,
            progress_within_book: None,
        }
    }

    pub fn with_progress(mut self, progress_within_book: f64) -> Self {
        self.progress_within_book = Some(progress_within_book);
        self
    }
}

impl LocationAnchor {
    /// Progression through the whole book, if the anchor carries one
    pub fn progress_within_book(&self) -> Option<f64> {
        match self {
            LocationAnchor::Text(text) => Some(text.progress_within_book),
            LocationAnchor::Audio(audio) => audio.progress_within_book,
        }
    }

    /// The href or track identifier this anchor resolves against
    pub fn resource(&self) -> &str {
        match self {
            LocationAnchor::Text(text) => &text.href,
            LocationAnchor::Audio(audio) => &audio.track_identifier,
        }
    }

    /// An anchor without an href or track identifier cannot be navigated to
    pub fn is_resolvable(&self) -> bool {
        !self.resource().trim().is_empty()
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, LocationAnchor::Audio(_))
    }

    /// Whether both anchors use the same content variant
    pub fn same_variant(&self, other: &LocationAnchor) -> bool {
        self.is_audio() == other.is_audio()
    }

    /// Chapter title carried by text anchors
    pub fn chapter_title(&self) -> Option<&str> {
        match self {
            LocationAnchor::Text(text) => text.chapter_title.as_deref(),
            LocationAnchor::Audio(_) => None,
        }
    }

    /// Approximate equality: exact on href/track, within
    /// [`PROGRESS_EPSILON`] on progress values.
    pub fn matches(&self, other: &LocationAnchor) -> bool {
        match (self, other) {
            (LocationAnchor::Text(a), LocationAnchor::Text(b)) => {
                a.href == b.href
                    && approximately_equal(
                        a.progress_within_chapter,
                        b.progress_within_chapter,
                        PROGRESS_EPSILON,
                    )
                    && approximately_equal(
                        a.progress_within_book,
                        b.progress_within_book,
                        PROGRESS_EPSILON,
                    )
            }
            (LocationAnchor::Audio(a), LocationAnchor::Audio(b)) => {
                a.track_identifier == b.track_identifier
                    && a.track_index == b.track_index
                    && a.offset_millis == b.offset_millis
                    && match (a.progress_within_book, b.progress_within_book) {
                        (Some(x), Some(y)) => approximately_equal(x, y, PROGRESS_EPSILON),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }

    /// Canonical locator string, as stored in an annotation selector.
    ///
    /// Keys are emitted in sorted order, so two anchors built from the same
    /// values always serialize identically. Float formatting is not
    /// normalized: 0.1 and 0.10000001 produce different strings.
    pub fn serialize(&self) -> String {
        self.to_locator().to_string()
    }
}

impl PartialEq for LocationAnchor {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}
