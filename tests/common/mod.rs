//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::sync::Notify;

use los_libros_sync::annotations::{RemoteAnnotationService, RemoteBookmarks};
use los_libros_sync::bookmarks::{BookmarkRecord, ReadingPosition};
use los_libros_sync::db;
use los_libros_sync::error::{SyncError, SyncResult};
use los_libros_sync::location::{AudioLocation, LocationAnchor, TextLocation};
use los_libros_sync::registry::SqliteRegistry;
use los_libros_sync::sync::{DeletionLog, SyncOrchestrator, SyncSettings};

pub const BOOK: &str = "urn:isbn:9780000000001";
pub const DEVICE: &str = "urn:uuid:device-local";
pub const OTHER_DEVICE: &str = "urn:uuid:device-other";

#[derive(Default)]
struct ServerState {
    bookmarks: HashMap<String, Vec<BookmarkRecord>>,
    positions: HashMap<String, Vec<ReadingPosition>>,
    next_id: u64,
    uploads: usize,
    deleted: Vec<String>,
    posted_positions: Vec<ReadingPosition>,
    malformed: usize,
}

#[derive(Default)]
struct Failures {
    offline: bool,
    unauthorized: bool,
    uploads: bool,
    deletes: bool,
    position_fetch: bool,
}

/// In-memory annotation service with failure injection
#[derive(Default)]
pub struct MockAnnotationService {
    state: Mutex<ServerState>,
    failures: Mutex<Failures>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    pub fetch_started: Notify,
}

impl MockAnnotationService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Put a record on the server as another client would
    pub fn seed(&self, book_id: &str, record: BookmarkRecord) {
        self.state
            .lock()
            .bookmarks
            .entry(book_id.to_string())
            .or_default()
            .push(record);
    }

    pub fn seed_position(&self, book_id: &str, position: ReadingPosition) {
        self.state
            .lock()
            .positions
            .entry(book_id.to_string())
            .or_default()
            .push(position);
    }

    /// Report this many unparseable items on the next fetches
    pub fn set_malformed(&self, count: usize) {
        self.state.lock().malformed = count;
    }

    pub fn server_bookmarks(&self, book_id: &str) -> Vec<BookmarkRecord> {
        self.state
            .lock()
            .bookmarks
            .get(book_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().uploads
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    pub fn posted_positions(&self) -> Vec<ReadingPosition> {
        self.state.lock().posted_positions.clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.failures.lock().offline = offline;
    }

    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.failures.lock().unauthorized = unauthorized;
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.failures.lock().uploads = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.failures.lock().deletes = fail;
    }

    pub fn fail_position_fetch(&self, fail: bool) {
        self.failures.lock().position_fetch = fail;
    }

    /// Block bookmark fetches until the returned gate is notified
    pub fn hold_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.fetch_gate.lock() = Some(gate.clone());
        gate
    }

    fn check_transport(&self) -> SyncResult<()> {
        let failures = self.failures.lock();
        if failures.offline {
            return Err(SyncError::NetworkUnavailable("connection refused".into()));
        }
        if failures.unauthorized {
            return Err(SyncError::AuthenticationRequired);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAnnotationService for MockAnnotationService {
    async fn fetch_bookmarks(&self, book_id: &str) -> SyncResult<RemoteBookmarks> {
        let gate = self.fetch_gate.lock().take();
        if let Some(gate) = gate {
            self.fetch_started.notify_one();
            gate.notified().await;
        }
        self.check_transport()?;

        let state = self.state.lock();
        Ok(RemoteBookmarks {
            records: state.bookmarks.get(book_id).cloned().unwrap_or_default(),
            malformed: state.malformed,
        })
    }

    async fn upload_bookmark(&self, book_id: &str, record: &BookmarkRecord) -> SyncResult<String> {
        self.check_transport()?;
        if self.failures.lock().uploads {
            return Err(SyncError::RemoteRejected { status: 500 });
        }

        let mut state = self.state.lock();
        state.next_id += 1;
        state.uploads += 1;
        let id = format!("https://annotations.test/{}", state.next_id);
        state
            .bookmarks
            .entry(book_id.to_string())
            .or_default()
            .push(record.clone().with_annotation_id(&id));
        Ok(id)
    }

    async fn delete_bookmark(&self, book_id: &str, annotation_id: &str) -> SyncResult<()> {
        self.check_transport()?;
        if self.failures.lock().deletes {
            return Err(SyncError::RemoteRejected { status: 503 });
        }

        let mut state = self.state.lock();
        if let Some(records) = state.bookmarks.get_mut(book_id) {
            records.retain(|r| r.annotation_id.as_deref() != Some(annotation_id));
        }
        state.deleted.push(annotation_id.to_string());
        Ok(())
    }

    async fn fetch_reading_position(&self, book_id: &str) -> SyncResult<Option<ReadingPosition>> {
        self.check_transport()?;
        if self.failures.lock().position_fetch {
            return Err(SyncError::NetworkUnavailable("timed out".into()));
        }

        let state = self.state.lock();
        Ok(state
            .positions
            .get(book_id)
            .and_then(|positions| positions.iter().max_by_key(|p| p.created_at))
            .cloned())
    }

    async fn post_reading_position(
        &self,
        book_id: &str,
        position: &ReadingPosition,
    ) -> SyncResult<()> {
        self.check_transport()?;

        let mut state = self.state.lock();
        state.posted_positions.push(position.clone());
        state
            .positions
            .entry(book_id.to_string())
            .or_default()
            .push(position.clone());
        Ok(())
    }
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        device_id: Some(DEVICE.to_string()),
        enabled: true,
        tombstone_retention_days: 90,
        position_post_interval: Duration::from_secs(15),
    }
}

pub fn orchestrator_on(
    pool: SqlitePool,
    remote: Arc<MockAnnotationService>,
    settings: SyncSettings,
) -> Arc<SyncOrchestrator> {
    Arc::new(SyncOrchestrator::new(
        Arc::new(SqliteRegistry::new(pool.clone())),
        remote,
        DeletionLog::new(pool),
        settings,
    ))
}

pub async fn orchestrator(remote: Arc<MockAnnotationService>) -> Arc<SyncOrchestrator> {
    let pool = db::connect_in_memory().await.unwrap();
    orchestrator_on(pool, remote, settings())
}

pub fn text(progress: f64) -> LocationAnchor {
    LocationAnchor::Text(TextLocation::new("/ch1.xhtml", progress, progress))
}

pub fn audio(track_index: i64, offset_millis: i64) -> LocationAnchor {
    LocationAnchor::Audio(AudioLocation::new(
        &format!("urn:track:{}", track_index),
        track_index,
        offset_millis,
    ))
}

/// A bookmark as another device would have uploaded it
pub fn remote_bookmark(progress: f64, annotation_id: &str, device: &str) -> BookmarkRecord {
    BookmarkRecord::new(text(progress), Some(device)).with_annotation_id(annotation_id)
}
