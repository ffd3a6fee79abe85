//! WebSocket transport for the movement relay.
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /ws`. Requests that are not a WebSocket upgrade
//!    get `400 Bad Request`.
//! 2. The server assigns a random connection id, registers the connection and
//!    sends `Connection ID: <uuid>` as the first text frame.
//! 3. Each inbound frame is answered according to [`processor`]. Responses go
//!    out strictly in inbound order.
//! 4. A connection that sends nothing for `idle_timeout_ms` (default 30 s) is
//!    closed with status 1000 and reason `Inactivity timeout`.
//! 5. A client close frame is answered with the same status and reason. The
//!    connection is then deregistered; its movement history stays readable
//!    through `GET /api/connections/{id}`.
//!
//! ## Messages (client → server)
//!
//! | Frame                      | Response(s)                                   |
//! |----------------------------|-----------------------------------------------|
//! | `ping`                     | `pong`                                        |
//! | `W` / `A` / `S` / `D`      | the token (after recording it)                |
//! | a registered connection id | that connection's history, then the id        |
//! | anything else              | echoed unchanged                              |
//!
//! Binary frames are decoded as UTF-8 (lossy) and answered the same way, with
//! the echo sent back as binary. History relays are always text.

pub mod processor;
pub mod session;

use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::AppState;

/// `GET /ws` — WebSocket upgrade handler.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!("Rejected non-upgrade request on /ws: {rejection}");
            return (StatusCode::BAD_REQUEST, "Expected a WebSocket upgrade").into_response();
        }
    };

    let max = state.config.server.max_message_size;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| session::run_session(socket, state))
}
