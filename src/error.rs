//! Error types for the sync engine and its HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::annotations::MalformedRemoteRecord;

/// Result type of engine operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Result type of HTTP handlers
pub type Result<T> = std::result::Result<T, AppError>;

/// Engine error kinds
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Malformed remote record: {0}")]
    MalformedRemoteRecord(#[from] MalformedRemoteRecord),

    #[error("Local storage failure: {0}")]
    LocalStorageFailure(String),

    #[error("Annotation service rejected the request with status {status}")]
    RemoteRejected { status: u16 },

    #[error("Location cannot be resolved in this book")]
    UnresolvableLocation,
}

impl SyncError {
    /// Errors that mean the server could not be reached or would not talk to us
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable(_) | SyncError::AuthenticationRequired
        )
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::LocalStorageFailure(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::LocalStorageFailure(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return SyncError::MalformedRemoteRecord(MalformedRemoteRecord::UndecodableResponse);
        }
        match e.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN =>
            {
                SyncError::AuthenticationRequired
            }
            Some(status) => SyncError::RemoteRejected {
                status: status.as_u16(),
            },
            None => SyncError::NetworkUnavailable(e.to_string()),
        }
    }
}

/// HTTP-facing error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Sync(e) => match e {
                SyncError::NetworkUnavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "network_unavailable",
                    "Annotation service is unreachable".to_string(),
                ),
                SyncError::AuthenticationRequired => (
                    StatusCode::UNAUTHORIZED,
                    "authentication_required",
                    "Annotation service requires authentication".to_string(),
                ),
                SyncError::MalformedRemoteRecord(_) | SyncError::RemoteRejected { .. } => {
                    tracing::warn!("Annotation service error: {}", e);
                    (
                        StatusCode::BAD_GATEWAY,
                        "remote_error",
                        "Annotation service returned an unusable response".to_string(),
                    )
                }
                SyncError::UnresolvableLocation => (
                    StatusCode::BAD_REQUEST,
                    "unresolvable_location",
                    e.to_string(),
                ),
                SyncError::LocalStorageFailure(msg) => {
                    tracing::error!("Local storage failure: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Local storage failure".to_string(),
                    )
                }
            },
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
