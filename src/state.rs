//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::commands::CommandLog;
use crate::config::Config;
use crate::registry::ConnectionRegistry;

/// Shared application state for the relay server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Currently open connections.
    pub registry: ConnectionRegistry,
    /// Movement history per connection, kept after the connection closes.
    pub commands: CommandLog,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            registry: ConnectionRegistry::new(),
            commands: CommandLog::new(),
        }
    }
}
