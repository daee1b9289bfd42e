//! Server annotation parsing and payload building
//!
//! Annotations written by older clients carry progress values in the body
//! rather than in the selector's locator. `BODY_FALLBACKS` lists every such
//! field in one place instead of chaining optional lookups.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{
    body_keys, Annotation, AnnotationBody, AnnotationTarget, FragmentSelector, Motivation,
    ANNOTATION_CONTEXT, ANNOTATION_TYPE, FRAGMENT_SELECTOR_TYPE, NULL_DEVICE,
};
use crate::bookmarks::BookmarkRecord;
use crate::location::{LocationAnchor, LocatorError};

/// Why a server annotation could not become a `BookmarkRecord`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MalformedRemoteRecord {
    #[error("annotation is not a JSON object")]
    NotAnObject,

    #[error("response body is not annotation JSON")]
    UndecodableResponse,

    #[error("annotation has no id")]
    MissingId,

    #[error("annotation is missing `{0}`")]
    MissingField(&'static str),

    #[error("annotation belongs to book {found}, expected {expected}")]
    WrongBook { expected: String, found: String },

    #[error("unexpected motivation: {0}")]
    WrongMotivation(String),

    #[error("invalid annotation time: {0}")]
    InvalidTimestamp(String),

    #[error("selector value is not a locator object")]
    UndecodableSelector,

    #[error("unusable locator: {0}")]
    Locator(#[from] LocatorError),
}

/// A locator field that may instead be found in the annotation body
struct BodyFallback {
    locator_key: &'static str,
    body_key: &'static str,
    default: Option<f64>,
}

/// Selector first, then body, then the default
const BODY_FALLBACKS: &[BodyFallback] = &[
    BodyFallback {
        locator_key: "progressWithinBook",
        body_key: body_keys::PROGRESS_WITHIN_BOOK,
        default: None,
    },
    BodyFallback {
        locator_key: "progressWithinChapter",
        body_key: body_keys::PROGRESS_WITHIN_CHAPTER,
        default: Some(0.0),
    },
];

/// Parse one server annotation for `book_id` with the given motivation
pub fn parse_annotation(
    value: &Value,
    book_id: &str,
    motivation: Motivation,
) -> Result<BookmarkRecord, MalformedRemoteRecord> {
    let annotation = value.as_object().ok_or(MalformedRemoteRecord::NotAnObject)?;

    let annotation_id = annotation
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(MalformedRemoteRecord::MissingId)?;

    let target = object(annotation, "target")?;
    let source = target
        .get("source")
        .and_then(Value::as_str)
        .ok_or(MalformedRemoteRecord::MissingField("target.source"))?;
    if source != book_id {
        return Err(MalformedRemoteRecord::WrongBook {
            expected: book_id.to_string(),
            found: source.to_string(),
        });
    }

    let found_motivation = annotation
        .get("motivation")
        .and_then(Value::as_str)
        .ok_or(MalformedRemoteRecord::MissingField("motivation"))?;
    if !found_motivation.contains(motivation.as_uri()) {
        return Err(MalformedRemoteRecord::WrongMotivation(
            found_motivation.to_string(),
        ));
    }

    let body = object(annotation, "body")?;
    let raw_time = body
        .get(body_keys::TIME)
        .and_then(Value::as_str)
        .ok_or(MalformedRemoteRecord::MissingField("body.time"))?;
    let created_at = DateTime::parse_from_rfc3339(raw_time)
        .map_err(|_| MalformedRemoteRecord::InvalidTimestamp(raw_time.to_string()))?
        .with_timezone(&Utc);

    let device = body
        .get(body_keys::DEVICE)
        .and_then(Value::as_str)
        .filter(|device| !device.is_empty() && *device != NULL_DEVICE);

    let selector = object(target, "selector")?;
    let raw_locator = selector
        .get("value")
        .and_then(Value::as_str)
        .ok_or(MalformedRemoteRecord::MissingField("target.selector.value"))?;
    let mut locator = match serde_json::from_str::<Value>(raw_locator) {
        Ok(Value::Object(map)) => map,
        _ => return Err(MalformedRemoteRecord::UndecodableSelector),
    };

    for fallback in BODY_FALLBACKS {
        if locator.contains_key(fallback.locator_key) {
            continue;
        }
        let value = body
            .get(fallback.body_key)
            .filter(|v| v.is_number())
            .cloned()
            .or_else(|| fallback.default.map(Value::from));
        if let Some(value) = value {
            locator.insert(fallback.locator_key.to_string(), value);
        }
    }

    let location = LocationAnchor::from_locator(&Value::Object(locator))?;

    let mut record = BookmarkRecord::new(location, device)
        .with_annotation_id(annotation_id)
        .with_created_at(created_at);
    if record.chapter_title.is_none() {
        record.chapter_title = body
            .get(body_keys::CHAPTER)
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
            .map(str::to_string);
    }

    Ok(record)
}

/// Build the annotation document uploaded for `record`
pub fn annotation_payload(
    book_id: &str,
    record: &BookmarkRecord,
    motivation: Motivation,
) -> Annotation {
    let (progress_within_book, progress_within_chapter) = match &record.location {
        LocationAnchor::Text(text) => (
            Some(text.progress_within_book),
            Some(text.progress_within_chapter),
        ),
        LocationAnchor::Audio(audio) => (audio.progress_within_book, None),
    };

    Annotation {
        context: ANNOTATION_CONTEXT.to_string(),
        annotation_type: ANNOTATION_TYPE.to_string(),
        id: record.annotation_id.clone(),
        motivation,
        body: AnnotationBody {
            time: record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            device: record
                .device_id
                .clone()
                .unwrap_or_else(|| NULL_DEVICE.to_string()),
            chapter: record.chapter_title.clone(),
            progress_within_book,
            progress_within_chapter,
        },
        target: AnnotationTarget {
            source: book_id.to_string(),
            selector: FragmentSelector {
                selector_type: FRAGMENT_SELECTOR_TYPE.to_string(),
                value: record.location.serialize(),
            },
        },
    }
}

fn object<'a>(
    map: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Map<String, Value>, MalformedRemoteRecord> {
    map.get(key)
        .and_then(Value::as_object)
        .ok_or(MalformedRemoteRecord::MissingField(key))
}
