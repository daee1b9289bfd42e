//! Per-book bookmark, position and sync routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

use crate::bookmarks::{BookmarkRecord, ReadingPosition};
use crate::error::{AppError, Result};
use crate::location::LocationAnchor;
use crate::state::AppState;
use crate::sync::{DeleteOutcome, SyncOutcome, SyncPhase};

/// Create the books router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:book_id", delete(return_book))
        .route("/:book_id/sync", post(synchronize).get(sync_status))
        .route(
            "/:book_id/bookmarks",
            get(list_bookmarks)
                .post(create_bookmark)
                .delete(delete_bookmark),
        )
        .route("/:book_id/position", get(get_position).put(record_position))
        .route("/:book_id/position/accept", post(accept_position))
}

#[derive(Serialize)]
struct SyncStatusResponse {
    phase: SyncPhase,
}

#[derive(Serialize)]
struct DeleteResponse {
    outcome: DeleteOutcome,
}

#[derive(Serialize)]
struct PositionResponse {
    recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<ReadingPosition>,
}

/// Run a reconciliation pass
async fn synchronize(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<SyncOutcome>> {
    let outcome = state.orchestrator().synchronize(&book_id).await?;
    Ok(Json(outcome))
}

/// Current phase of the book's pass
async fn sync_status(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        phase: state.orchestrator().phase(&book_id),
    })
}

async fn list_bookmarks(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<BookmarkRecord>>> {
    let bookmarks = state.orchestrator().bookmarks(&book_id).await?;
    Ok(Json(bookmarks))
}

async fn create_bookmark(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Json(location): Json<LocationAnchor>,
) -> Result<(StatusCode, Json<BookmarkRecord>)> {
    let record = state
        .orchestrator()
        .create_bookmark(&book_id, location)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn delete_bookmark(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Json(record): Json<BookmarkRecord>,
) -> Result<Json<DeleteResponse>> {
    let outcome = state
        .orchestrator()
        .delete_bookmark(&book_id, &record)
        .await?;
    Ok(Json(DeleteResponse { outcome }))
}

async fn get_position(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<ReadingPosition>> {
    let position = state
        .orchestrator()
        .reading_position(&book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No reading position for book: {}", book_id)))?;
    Ok(Json(position))
}

/// Reading heartbeat
async fn record_position(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Json(location): Json<LocationAnchor>,
) -> Result<Json<PositionResponse>> {
    let position = state
        .orchestrator()
        .record_position(&book_id, location)
        .await?;
    Ok(Json(PositionResponse {
        recorded: position.is_some(),
        position,
    }))
}

/// The reader accepted a prompted remote position
async fn accept_position(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Json(position): Json<ReadingPosition>,
) -> Result<StatusCode> {
    state
        .orchestrator()
        .accept_position(&book_id, &position)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Book returned or un-borrowed
async fn return_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<StatusCode> {
    state.orchestrator().return_book(&book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
