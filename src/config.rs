//! Configuration management for Ratekeeper.
//!
//! Settings are layered: built-in defaults, then an optional file, then
//! `RATEKEEPER__*` environment variables. Command line flags are applied on
//! top by the binary.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RatekeeperError, Result};
use crate::ratelimit::Rate;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "RATEKEEPER";

/// Port used when none is configured, the default HTTP port.
pub const DEFAULT_PORT: u16 = 80;

/// Main configuration for Ratekeeper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on on localhost; [`DEFAULT_PORT`] when unset, and 0 picks
    /// a free port
    #[serde(default)]
    pub port: Option<u16>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per window, per key
    #[serde(default = "default_requests")]
    pub requests: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Period between sweeps of idle per-key limiters, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Worker threads of the dedicated cleanup scheduler
    #[serde(default = "default_cleanup_threads")]
    pub cleanup_threads: usize,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            window_ms: default_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            cleanup_threads: default_cleanup_threads(),
        }
    }
}

fn default_requests() -> u64 {
    100
}

fn default_window_ms() -> u64 {
    3_600_000
}

fn default_sweep_interval_ms() -> u64 {
    10
}

fn default_cleanup_threads() -> usize {
    1
}

impl ServerConfig {
    /// Loopback address the server binds.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port.unwrap_or(DEFAULT_PORT)))
    }
}

impl RateLimitingConfig {
    /// The configured rate, validated.
    pub fn rate(&self) -> Result<Rate> {
        Rate::new(self.requests, Duration::from_millis(self.window_ms))
    }

    /// The configured sweep period.
    pub fn sweep_interval(&self) -> Result<Duration> {
        if self.sweep_interval_ms == 0 {
            return Err(RatekeeperError::Config(
                "sweep_interval_ms should be positive".to_string(),
            ));
        }
        Ok(Duration::from_millis(self.sweep_interval_ms))
    }
}

impl RatekeeperConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// The file format is inferred from its extension (YAML, TOML, JSON).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading config file");
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| RatekeeperError::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RatekeeperError::Config(format!("Failed to parse configuration: {}", e)))
    }
}
