//! HTTP surface
//!
//! Deliberately small: a liveness endpoint and the range-aware streaming
//! endpoint. Catalog browsing lives elsewhere.

pub mod health;
pub mod stream;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::storage::StorageManager;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    pub storage: StorageManager,
}

/// Build the application router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::liveness))
        .route(
            "/{id}",
            get(stream::stream_asset).head(stream::asset_head),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
