//! Sync pass types

use serde::{Deserialize, Serialize};

use crate::bookmarks::ReadingPosition;
use crate::config::SyncConfig;

/// Where a book's reconciliation pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Idle,
    UploadingNew,
    FetchingRemote,
    Reconciling,
    WritingLocal,
    UploadingDeletes,
}

/// Result of one `synchronize` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// Bookmarks discovered on the server that were not known locally
    pub new_bookmark_count: usize,
    /// Remote position the reader should be offered
    pub position_prompt: Option<ReadingPosition>,
    /// Remote position already written to the registry
    pub restored_position: Option<ReadingPosition>,
    /// Another pass for the book was in flight; nothing was done
    pub coalesced: bool,
    /// The book was returned mid-pass and the results were dropped
    #[serde(skip_serializing_if = "is_false")]
    pub discarded: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub failed_uploads: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub failed_deletes: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub malformed: usize,
}

impl SyncOutcome {
    pub fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Default::default()
        }
    }

    pub fn discarded() -> Self {
        Self {
            discarded: true,
            ..Default::default()
        }
    }
}

fn is_false(value: &bool) -> bool {
    !value
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// Result of deleting one bookmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteOutcome {
    /// Removed locally and on the server
    Confirmed,
    /// Removed locally; the server delete failed and a tombstone remains
    Pending,
    /// Removed locally; the record was never uploaded or sync is off
    LocalOnly,
    /// No matching bookmark
    NotFound,
}

/// Engine settings taken from the daemon configuration
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub device_id: Option<String>,
    pub enabled: bool,
    pub tombstone_retention_days: i64,
    pub position_post_interval: std::time::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncConfig::default().into()
    }
}

impl From<SyncConfig> for SyncSettings {
    fn from(config: SyncConfig) -> Self {
        Self {
            device_id: config.device_id,
            enabled: config.enabled,
            tombstone_retention_days: config.tombstone_retention_days,
            position_post_interval: std::time::Duration::from_secs(
                config.position_post_interval_secs,
            ),
        }
    }
}
