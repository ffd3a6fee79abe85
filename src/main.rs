#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # movement-relay
//!
//! WebSocket relay that echoes messages, records per-connection movement
//! commands and lets any connection fetch another's history by id.
//!
//! ## API surface
//!
//! | Method | Path                      | Description                                  |
//! |--------|---------------------------|----------------------------------------------|
//! | GET    | `/ws`                     | WebSocket relay (see `ws` module docs)       |
//! | GET    | `/api/health`             | Liveness check with connection counts        |
//! | GET    | `/api/connections`        | Open connections                             |
//! | GET    | `/api/connections/{id}`   | One connection's status and movement history |
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, clap subcommands, graceful shutdown
//! config.rs        — TOML + env-var configuration
//! connection.rs    — ConnectionId, ConnectionHandle (latched close)
//! registry.rs      — ConnectionRegistry (DashMap) + drop-guard Registration
//! commands.rs      — Movement, CommandLog (DashMap, append-only)
//! watchdog.rs      — per-connection idle deadline
//! routes/
//!   mod.rs         — router assembly
//!   health.rs      — GET /api/health
//!   connections.rs — GET /api/connections[/{id}]
//! ws/
//!   mod.rs         — WebSocket upgrade
//!   session.rs     — per-connection session loop and writer task
//!   processor.rs   — inbound message interpretation
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use movement_relay::{router, AppState, Config};

/// WebSocket movement relay.
#[derive(Parser)]
#[command(name = "movement-relay", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to TOML config file (when no subcommand is given).
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server (default when no subcommand given).
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) | None => run_server(cli.config.as_deref()).await,
    }
}

async fn run_server(config_path: Option<&str>) -> ExitCode {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("movement-relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("movement-relay v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Idle timeout {}ms, max message size {} bytes",
        config.server.idle_timeout_ms, config.server.max_message_size
    );

    let state = AppState::new(config);
    let app = router(state.clone());

    let listener = match TcpListener::bind(&state.config.server.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {e}", state.config.server.listen);
            return ExitCode::FAILURE;
        }
    };
    info!("Listening on {}", state.config.server.listen);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        "Shutting down with {} open connection(s), {} logged",
        state.registry.len(),
        state.commands.len()
    );
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}
