//! Read-only introspection over open connections and their movement history.
//!
//! - `GET /api/connections`      — list open connections
//! - `GET /api/connections/{id}` — one connection's status and history

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::connection::ConnectionId;
use crate::AppState;

/// `GET /api/connections` — open connections, oldest first.
pub async fn list_connections(State(state): State<AppState>) -> Json<Value> {
    let mut handles = state.registry.handles();
    handles.sort_by_key(|h| h.connected_at());

    let connections: Vec<Value> = handles
        .iter()
        .map(|h| {
            let id = h.id();
            json!({
                "id": id.to_string(),
                "connected_secs": h.connected_at().elapsed().as_secs(),
                "movements": state.commands.read(&id).len(),
            })
        })
        .collect();

    Json(json!({ "connections": connections }))
}

/// `GET /api/connections/{id}` — whether the connection is open and what it
/// has recorded so far.
///
/// `400` if `id` is not a UUID, `404` if the id is neither open nor has any
/// history.
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let id: ConnectionId = id.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Invalid connection id: {id}")})),
        )
    })?;

    let handle = state.registry.lookup(&id);
    if handle.is_none() && !state.commands.contains(&id) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Connection {id} not found")})),
        ));
    }

    let movements: Vec<&str> = state
        .commands
        .read(&id)
        .into_iter()
        .map(|m| m.as_str())
        .collect();

    Ok(Json(json!({
        "id": id.to_string(),
        "active": handle.is_some(),
        "connected_secs": handle.map(|h| h.connected_at().elapsed().as_secs()),
        "movements": movements,
    })))
}
