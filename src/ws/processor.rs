//! Inbound message interpretation.
//!
//! [`process`] decides what a connection gets back for one inbound message:
//!
//! | Inbound                         | Effect                                  | Echo           |
//! |---------------------------------|-----------------------------------------|----------------|
//! | `ping`                          | —                                       | `pong`         |
//! | `W` / `A` / `S` / `D`           | appended to the sender's command log    | the token      |
//! | id of a registered connection   | relay of that connection's history      | the id itself  |
//! | anything else                   | —                                       | unchanged      |
//!
//! A relay is sent *before* the echo, never instead of it. Once a connection
//! is deregistered its id is echoed like any other text, even though its
//! history is still in the log.

use tracing::debug;

use crate::commands::{CommandLog, Movement};
use crate::connection::ConnectionId;
use crate::registry::ConnectionRegistry;

/// Outbound messages produced for one inbound message, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Another connection's history, space-joined. Always sent as text.
    pub relay: Option<String>,
    /// Sent back with the inbound frame's type.
    pub echo: String,
}

pub fn process(
    text: &str,
    sender: ConnectionId,
    registry: &ConnectionRegistry,
    commands: &CommandLog,
) -> Reply {
    let mut echo = text;
    if text == "ping" {
        echo = "pong";
    }

    if let Ok(movement) = text.parse::<Movement>() {
        commands.append(sender, movement);
        debug!(connection_id = %sender, %movement, "Movement recorded");
    }

    let relay = text
        .parse::<ConnectionId>()
        .ok()
        .filter(|target| registry.contains(target))
        .map(|target| {
            let history = commands.render(&target);
            debug!(connection_id = %sender, target = %target, "Relaying command history");
            history
        });

    Reply {
        relay,
        echo: echo.to_string(),
    }
}
