//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::feed::encoded_feed;

use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/gtfs-rt", get(feed))
        .route("/status", get(status))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// The current feed, freshly encoded per request.
async fn feed(State(state): State<AppState>) -> Response {
    if !state.aggregator.has_published() {
        return (StatusCode::NOT_FOUND, "no feed published yet").into_response();
    }
    let bytes = encoded_feed(&state.aggregator).await;
    ([(header::CONTENT_TYPE, "application/x-protobuf")], bytes).into_response()
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    entities: u64,
    last_modified: Option<u64>,
}

/// Feed statistics for monitoring.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        entities: state.aggregator.entity_count().await,
        last_modified: state.aggregator.last_modified_secs(),
    })
}
