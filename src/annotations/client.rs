//! HTTP client for the annotation service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};

use super::parser::{annotation_payload, parse_annotation};
use super::service::{RemoteAnnotationService, RemoteBookmarks};
use super::types::{AnnotationCollection, CreatedAnnotation, Motivation};
use crate::bookmarks::{BookmarkRecord, ReadingPosition};
use crate::config::AnnotationsConfig;
use crate::error::{SyncError, SyncResult};

/// `RemoteAnnotationService` over HTTP
#[derive(Clone, Debug)]
pub struct HttpAnnotationService {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpAnnotationService {
    pub fn new(config: &AnnotationsConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::NetworkUnavailable(e.to_string()))?;
        tracing::debug!(base_url = %config.base_url, "creating HttpAnnotationService");

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    /// Collection URL of one book's annotations
    fn book_url(&self, book_id: &str) -> String {
        format!("{}/{}/", self.base_url, urlencoding::encode(book_id))
    }

    /// Annotation IDs are usually absolute URLs; bare IDs live under the base
    fn annotation_url(&self, annotation_id: &str) -> String {
        if annotation_id.starts_with("http://") || annotation_id.starts_with("https://") {
            annotation_id.to_string()
        } else {
            format!("{}/{}", self.base_url, urlencoding::encode(annotation_id))
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = self.authorized(request).send().await?;
        check_status(response.status())?;
        Ok(response)
    }

    async fn fetch_items(&self, book_id: &str) -> SyncResult<Vec<serde_json::Value>> {
        let url = self.book_url(book_id);
        tracing::debug!(%url, "GET annotations");
        let response = self.send(self.client.get(&url)).await?;
        let collection: AnnotationCollection = response.json().await?;
        Ok(collection.into_items())
    }

    async fn post(&self, book_id: &str, record: &BookmarkRecord, motivation: Motivation) -> SyncResult<String> {
        let payload = annotation_payload(book_id, record, motivation);
        tracing::debug!(url = %self.base_url, book_id, motivation = motivation.as_uri(), "POST annotation");
        let response = self.send(self.client.post(&self.base_url).json(&payload)).await?;
        let created: CreatedAnnotation = response.json().await?;
        Ok(created.id)
    }
}

fn check_status(status: StatusCode) -> SyncResult<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::AuthenticationRequired);
    }
    if !status.is_success() {
        return Err(SyncError::RemoteRejected {
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[async_trait]
impl RemoteAnnotationService for HttpAnnotationService {
    async fn fetch_bookmarks(&self, book_id: &str) -> SyncResult<RemoteBookmarks> {
        let mut bookmarks = RemoteBookmarks::default();

        for item in self.fetch_items(book_id).await? {
            match parse_annotation(&item, book_id, Motivation::Bookmark) {
                Ok(record) => bookmarks.records.push(record),
                // Reading positions share the collection
                Err(super::MalformedRemoteRecord::WrongMotivation(_)) => {}
                Err(e) => {
                    tracing::warn!(book_id, "Dropping malformed bookmark: {}", e);
                    bookmarks.malformed += 1;
                }
            }
        }

        Ok(bookmarks)
    }

    async fn upload_bookmark(&self, book_id: &str, record: &BookmarkRecord) -> SyncResult<String> {
        self.post(book_id, record, Motivation::Bookmark).await
    }

    async fn delete_bookmark(&self, _book_id: &str, annotation_id: &str) -> SyncResult<()> {
        let url = self.annotation_url(annotation_id);
        tracing::debug!(%url, "DELETE annotation");
        match self.send(self.client.delete(&url)).await {
            Ok(_) => Ok(()),
            // Already gone counts as deleted
            Err(SyncError::RemoteRejected { status: 404 }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn fetch_reading_position(&self, book_id: &str) -> SyncResult<Option<ReadingPosition>> {
        let latest = self
            .fetch_items(book_id)
            .await?
            .iter()
            .filter_map(|item| parse_annotation(item, book_id, Motivation::ReadingProgress).ok())
            .max_by_key(|position| position.created_at);

        Ok(latest)
    }

    async fn post_reading_position(
        &self,
        book_id: &str,
        position: &ReadingPosition,
    ) -> SyncResult<()> {
        self.post(book_id, position, Motivation::ReadingProgress)
            .await
            .map(|_| ())
    }
}
