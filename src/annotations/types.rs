//! Annotation wire types
//!
//! Bookmarks and reading positions travel as W3C Web Annotations, profiled
//! by the Library Simplified bookmark vocabulary.
//!
//! Reference: <https://www.w3.org/TR/annotation-model/>

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ANNOTATION_CONTEXT: &str = "http://www.w3.org/ns/anno.jsonld";
pub const ANNOTATION_TYPE: &str = "Annotation";
pub const FRAGMENT_SELECTOR_TYPE: &str = "oa:FragmentSelector";

/// Body keys of the Library Simplified vocabulary
pub mod body_keys {
    pub const TIME: &str = "http://librarysimplified.org/terms/time";
    pub const DEVICE: &str = "http://librarysimplified.org/terms/device";
    pub const CHAPTER: &str = "http://librarysimplified.org/terms/chapter";
    pub const PROGRESS_WITHIN_BOOK: &str = "http://librarysimplified.org/terms/progressWithinBook";
    pub const PROGRESS_WITHIN_CHAPTER: &str =
        "http://librarysimplified.org/terms/progressWithinChapter";
}

/// Device value sent when the record has no device
pub const NULL_DEVICE: &str = "null";

/// Why an annotation exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Motivation {
    /// An explicit user bookmark
    #[serde(rename = "http://www.w3.org/ns/oa#bookmarking")]
    Bookmark,
    /// The last read position
    #[serde(rename = "http://librarysimplified.org/terms/annotation/idling")]
    ReadingProgress,
}

impl Motivation {
    pub fn as_uri(&self) -> &'static str {
        match self {
            Motivation::Bookmark => "http://www.w3.org/ns/oa#bookmarking",
            Motivation::ReadingProgress => "http://librarysimplified.org/terms/annotation/idling",
        }
    }
}

/// Outgoing annotation document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub annotation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub motivation: Motivation,
    pub body: AnnotationBody,
    pub target: AnnotationTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationBody {
    #[serde(rename = "http://librarysimplified.org/terms/time")]
    pub time: String,
    #[serde(rename = "http://librarysimplified.org/terms/device")]
    pub device: String,
    #[serde(
        rename = "http://librarysimplified.org/terms/chapter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub chapter: Option<String>,
    #[serde(
        rename = "http://librarysimplified.org/terms/progressWithinBook",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub progress_within_book: Option<f64>,
    #[serde(
        rename = "http://librarysimplified.org/terms/progressWithinChapter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub progress_within_chapter: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationTarget {
    /// Book identifier
    pub source: String,
    pub selector: FragmentSelector,
}

/// Selector whose value is a serialized locator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSelector {
    #[serde(rename = "type")]
    pub selector_type: String,
    pub value: String,
}

/// Paged collection returned when listing a book's annotations.
///
/// Items stay as raw JSON so one bad entry cannot fail the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationCollection {
    #[serde(default)]
    pub first: Option<AnnotationPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationPage {
    #[serde(default)]
    pub items: Vec<Value>,
}

impl AnnotationCollection {
    pub fn into_items(self) -> Vec<Value> {
        self.first.map(|page| page.items).unwrap_or_default()
    }
}

/// Response to a successful upload
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedAnnotation {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motivation_uris() {
        let json = serde_json::to_value(Motivation::ReadingProgress).unwrap();
        assert_eq!(json, Motivation::ReadingProgress.as_uri());
        let parsed: Motivation =
            serde_json::from_str("\"http://www.w3.org/ns/oa#bookmarking\"").unwrap();
        assert_eq!(parsed, Motivation::Bookmark);
    }

    #[test]
    fn test_collection_without_first_page_is_empty() {
        let collection: AnnotationCollection = serde_json::from_str("{}").unwrap();
        assert!(collection.into_items().is_empty());
    }
}
