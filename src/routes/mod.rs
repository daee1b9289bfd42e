//! HTTP surface for the reader
//!
//! - `/health`
//! - `/api/v1/books/:book_id/...` bookmarks, positions and sync passes

pub mod books;
pub mod health;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/books", books::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
