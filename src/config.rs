//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `RELAY_LISTEN`, `RELAY_IDLE_TIMEOUT_MS`
//! 2. **Config file** — path via `--config <path>`, or `relay.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! idle_timeout_ms = 30000
//! outbound_queue = 64
//! max_message_size = 4096
//! close_grace_ms = 5000
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "relay.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener and per-connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Idle window before the watchdog closes a connection (default 30 000).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Outbound frames buffered per connection before senders wait (default 64).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Largest inbound frame accepted, in bytes (default 4096).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// How long a closing session waits for its close frame to flush (default 5000).
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_idle_timeout_ms() -> u64 {
    30_000
}
fn default_outbound_queue() -> usize {
    64
}
fn default_max_message_size() -> usize {
    4 * 1024
}
fn default_close_grace_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            idle_timeout_ms: default_idle_timeout_ms(),
            outbound_queue: default_outbound_queue(),
            max_message_size: default_max_message_size(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `relay.toml` in the
    /// current directory is used when present, falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(Path::new(p))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };

        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(listen) = get("RELAY_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(value) = get("RELAY_IDLE_TIMEOUT_MS") {
            self.server.idle_timeout_ms = value.parse().map_err(|_| ConfigError::Env {
                var: "RELAY_IDLE_TIMEOUT_MS",
                value,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.server.max_message_size, 4096);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:9000"
            idle_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.idle_timeout_ms, 500);
        assert_eq!(config.server.outbound_queue, 64);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(|var| match var {
                "RELAY_LISTEN" => Some("127.0.0.1:1".to_string()),
                "RELAY_IDLE_TIMEOUT_MS" => Some("1500".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:1");
        assert_eq!(config.server.idle_timeout_ms, 1500);
    }

    #[test]
    fn test_env_rejects_bad_timeout() {
        let mut config = Config::default();
        let err = config
            .apply_env(|var| (var == "RELAY_IDLE_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::load(Some("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
