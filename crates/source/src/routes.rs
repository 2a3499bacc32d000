//! Route configuration for the event source.

use crate::handlers::{health_handler, stream_handler, SourceState};
use axum::routing::get;
use axum::Router;

/// Create the router with all source routes.
pub fn create_router(state: SourceState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stream", get(stream_handler))
        .with_state(state)
}
