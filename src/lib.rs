#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! movement-relay library: the connection lifecycle core plus its HTTP shell.
//!
//! - `connection` — connection ids and the latched close handle
//! - `registry` — open connections, keyed by id
//! - `commands` — movement tokens and the per-connection command log
//! - `watchdog` — resettable per-connection idle deadline
//! - `ws` — upgrade handler, session loop, message processing
//! - `routes` — router assembly and introspection endpoints
//! - `config` — TOML + env-var configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod registry;
pub mod routes;
pub mod state;
pub mod watchdog;
pub mod ws;

// Re-export key types at crate root for convenience.
pub use commands::{CommandLog, Movement};
pub use config::Config;
pub use connection::{ConnectionHandle, ConnectionId};
pub use registry::ConnectionRegistry;
pub use routes::router;
pub use state::AppState;
