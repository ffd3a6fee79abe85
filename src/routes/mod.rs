//! HTTP route handlers and router assembly.
//!
//! Each sub-module corresponds to an API endpoint group. None of them mutate
//! relay state; the WebSocket endpoint lives in [`crate::ws`].

pub mod connections;
pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(crate::ws::ws_upgrade))
        .route("/api/health", get(health::health))
        .route("/api/connections", get(connections::list_connections))
        .route("/api/connections/{id}", get(connections::get_connection))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
