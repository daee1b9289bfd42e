//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::annotations::RemoteAnnotationService;
use crate::config::Config;
use crate::registry::SqliteRegistry;
use crate::sync::{DeletionLog, SyncOrchestrator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    orchestrator: SyncOrchestrator,
}

impl AppState {
    /// Wire the sync engine to the database and the annotation service
    pub fn new(config: Config, db: SqlitePool, remote: Arc<dyn RemoteAnnotationService>) -> Self {
        let orchestrator = SyncOrchestrator::new(
            Arc::new(SqliteRegistry::new(db.clone())),
            remote,
            DeletionLog::new(db.clone()),
            config.sync.clone().into(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                orchestrator,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the sync engine
    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.inner.orchestrator
    }

    /// Send queued reading positions before the process exits
    pub async fn shutdown(&self) {
        tracing::info!("Flushing queued reading positions...");
        self.inner.orchestrator.flush_positions().await;
    }
}
