//! Annotation service integration
//!
//! Bookmarks and reading positions are stored remotely as W3C Web
//! Annotations. This module holds:
//!
//! - the wire types and motivations
//! - the payload parser and builder
//! - the `RemoteAnnotationService` contract and its HTTP implementation

mod client;
mod parser;
mod service;
mod types;

pub use client::HttpAnnotationService;
pub use parser::{annotation_payload, parse_annotation, MalformedRemoteRecord};
pub use service::{RemoteAnnotationService, RemoteBookmarks};
pub use types::{
    body_keys, Annotation, AnnotationBody, AnnotationCollection, AnnotationTarget,
    CreatedAnnotation, FragmentSelector, Motivation, NULL_DEVICE,
};
