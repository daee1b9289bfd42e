//! Locator JSON form of a `LocationAnchor`
//!
//! This is the string carried in an annotation's `FragmentSelector` value.

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::{AudioLocation, LocationAnchor, TextLocation};

pub const TEXT_LOCATOR_TYPE: &str = "LocatorHrefProgression";
pub const AUDIO_LOCATOR_TYPE: &str = "LocatorAudioBookTime";
pub const LEGACY_LOCATOR_TYPE: &str = "LocatorLegacyCFI";

const AUDIO_LOCATOR_VERSION: u64 = 2;

/// Reasons a locator cannot be turned into an anchor
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocatorError {
    #[error("locator is not a JSON object")]
    NotAnObject,

    #[error("legacy CFI locators are not supported")]
    Legacy,

    #[error("unsupported locator type: {0}")]
    UnsupportedType(String),

    #[error("locator is missing `{0}`")]
    MissingField(&'static str),

    #[error("locator field `{0}` is invalid")]
    InvalidField(&'static str),
}

impl LocationAnchor {
    /// Build the locator object for this anchor
    pub fn to_locator(&self) -> Value {
        match self {
            LocationAnchor::Text(text) => {
                let mut locator = json!({
                    "@type": TEXT_LOCATOR_TYPE,
                    "href": text.href,
                    "progressWithinChapter": text.progress_within_chapter,
                    "progressWithinBook": text.progress_within_book,
                });
                if let Some(map) = locator.as_object_mut() {
                    if let Some(title) = &text.chapter_title {
                        map.insert("title".into(), Value::String(title.clone()));
                    }
                    if let Some(page) = &text.page_label {
                        map.insert("page".into(), Value::String(page.clone()));
                    }
                }
                locator
            }
            LocationAnchor::Audio(audio) => {
                let mut locator = json!({
                    "@type": AUDIO_LOCATOR_TYPE,
                    "@version": AUDIO_LOCATOR_VERSION,
                    "readingOrderItem": audio.track_identifier,
                    "readingOrderItemOffsetMilliseconds": audio.offset_millis,
                    "chapter": audio.track_index,
                });
                if let (Some(map), Some(progress)) =
                    (locator.as_object_mut(), audio.progress_within_book)
                {
                    map.insert("progressWithinBook".into(), json!(progress));
                }
                locator
            }
        }
    }

    /// Decode a locator object.
    ///
    /// Locators without an `@type` are accepted when the variant can be
    /// told from their keys.
    pub fn from_locator(value: &Value) -> Result<Self, LocatorError> {
        let map = value.as_object().ok_or(LocatorError::NotAnObject)?;

        match map.get("@type").and_then(Value::as_str) {
            Some(TEXT_LOCATOR_TYPE) => text_from_map(map),
            Some(AUDIO_LOCATOR_TYPE) => audio_from_map(map),
            Some(LEGACY_LOCATOR_TYPE) => Err(LocatorError::Legacy),
            Some(other) => Err(LocatorError::UnsupportedType(other.to_string())),
            None if map.contains_key("readingOrderItem") => audio_from_map(map),
            None if map.contains_key("href") => text_from_map(map),
            None => Err(LocatorError::MissingField("@type")),
        }
    }

    /// Decode a locator from its serialized string form
    pub fn from_locator_str(raw: &str) -> Result<Self, LocatorError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| LocatorError::NotAnObject)?;
        Self::from_locator(&value)
    }
}

fn text_from_map(map: &Map<String, Value>) -> Result<LocationAnchor, LocatorError> {
    let href = required_str(map, "href")?;

    let progress_within_chapter = match map.get("progressWithinChapter") {
        Some(value) => progress(value, "progressWithinChapter")?,
        None => 0.0,
    };
    let progress_within_book = progress(
        map.get("progressWithinBook")
            .ok_or(LocatorError::MissingField("progressWithinBook"))?,
        "progressWithinBook",
    )?;

    Ok(LocationAnchor::Text(TextLocation {
        href,
        progress_within_chapter,
        progress_within_book,
        chapter_title: optional_str(map, "title"),
        page_label: optional_str(map, "page"),
    }))
}

fn audio_from_map(map: &Map<String, Value>) -> Result<LocationAnchor, LocatorError> {
    let track_identifier = required_str(map, "readingOrderItem")?;

    // version 1 locators kept the offset under `time`
    let offset = map
        .get("readingOrderItemOffsetMilliseconds")
        .or_else(|| map.get("time"))
        .ok_or(LocatorError::MissingField("readingOrderItemOffsetMilliseconds"))?;
    let offset_millis = millis(offset)?;

    let track_index = match map.get("chapter") {
        Some(Value::Number(n)) => n.as_i64().ok_or(LocatorError::InvalidField("chapter"))?,
        Some(Value::String(s)) => s
            .parse::<i64>()
            .map_err(|_| LocatorError::InvalidField("chapter"))?,
        _ => 0,
    };

    let progress_within_book = map
        .get("progressWithinBook")
        .map(|value| progress(value, "progressWithinBook"))
        .transpose()?;

    Ok(LocationAnchor::Audio(AudioLocation {
        track_identifier,
        track_index,
        offset_millis,
        progress_within_book,
    }))
}

fn required_str(map: &Map<String, Value>, key: &'static str) -> Result<String, LocatorError> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None => Err(LocatorError::MissingField(key)),
        Some(_) => Err(LocatorError::InvalidField(key)),
    }
}

fn optional_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn progress(value: &Value, key: &'static str) -> Result<f64, LocatorError> {
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v.clamp(0.0, 1.0)),
        _ => Err(LocatorError::InvalidField(key)),
    }
}

fn millis(value: &Value) -> Result<i64, LocatorError> {
    const FIELD: &str = "readingOrderItemOffsetMilliseconds";

    if let Some(v) = value.as_i64() {
        return if v >= 0 { Ok(v) } else { Err(LocatorError::InvalidField(FIELD)) };
    }
    match value.as_f64() {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v as i64),
        _ => Err(LocatorError::InvalidField(FIELD)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_locator_keys_are_sorted() {
        let anchor = LocationAnchor::Text(
            TextLocation::new("/ch1.xhtml", 0.5, 0.1).with_chapter_title("Chapter 1"),
        );
        let serialized = anchor.serialize();
        assert!(serialized.starts_with("{\"@type\":\"LocatorHrefProgression\",\"href\""));
        assert!(serialized.contains("\"title\":\"Chapter 1\""));
    }

    #[test]
    fn test_text_locator_missing_chapter_progress_defaults_to_zero() {
        let value = json!({
            "@type": "LocatorHrefProgression",
            "href": "/ch2.xhtml",
            "progressWithinBook": 0.4
        });
        let anchor = LocationAnchor::from_locator(&value).unwrap();
        match anchor {
            LocationAnchor::Text(text) => {
                assert_eq!(text.progress_within_chapter, 0.0);
                assert_eq!(text.progress_within_book, 0.4);
            }
            _ => panic!("expected text anchor"),
        }
    }

    #[test]
    fn test_audio_locator_accepts_float_offset_and_string_chapter() {
        let value = json!({
            "@type": "LocatorAudioBookTime",
            "@version": 2,
            "readingOrderItem": "urn:track:3",
            "readingOrderItemOffsetMilliseconds": 1200.0,
            "chapter": "3"
        });
        let anchor = LocationAnchor::from_locator(&value).unwrap();
        match anchor {
            LocationAnchor::Audio(audio) => {
                assert_eq!(audio.offset_millis, 1200);
                assert_eq!(audio.track_index, 3);
                assert!(audio.progress_within_book.is_none());
            }
            _ => panic!("expected audio anchor"),
        }
    }

    #[test]
    fn test_untyped_locator_infers_variant() {
        let value = json!({"href": "/ch3.xhtml", "progressWithinBook": 0.9});
        assert!(!LocationAnchor::from_locator(&value).unwrap().is_audio());
    }

    #[test]
    fn test_rejected_locators() {
        let legacy = json!({"@type": "LocatorLegacyCFI", "contentCFI": "/4/2"});
        assert_eq!(
            LocationAnchor::from_locator(&legacy),
            Err(LocatorError::Legacy)
        );

        let no_href = json!({"@type": "LocatorHrefProgression", "progressWithinBook": 0.2});
        assert_eq!(
            LocationAnchor::from_locator(&no_href),
            Err(LocatorError::MissingField("href"))
        );

        let negative = json!({
            "@type": "LocatorAudioBookTime",
            "readingOrderItem": "urn:track:1",
            "readingOrderItemOffsetMilliseconds": -5
        });
        assert!(LocationAnchor::from_locator(&negative).is_err());
    }
}
