//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::limits::LimitsConfig;
use super::listen::{HttpConfig, ListenConfig, WebSocketConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// WebSocket listen configuration.
    pub listen: ListenConfig,
    /// WebSocket endpoint paths and origin policy.
    #[serde(default)]
    pub websocket: WebSocketConfig,
    /// Identity verification.
    pub auth: AuthConfig,
    /// Queue capacities.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Connection timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Optional HTTP surface (metrics, stats, broadcast ingress).
    pub http: Option<HttpConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, used in logs.
    pub name: String,
}

/// Identity verification configuration.
///
/// Tokens are HS256-signed by the chat backend that issues logins; this
/// service only verifies them.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret.
    pub jwt_secret: String,
    /// Seconds of clock skew tolerated when checking `exp` (default: 30).
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

/// Connection timeout configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds without any inbound frame before a connection is closed.
    /// `0` disables the idle timeout (default).
    #[serde(default)]
    pub idle_secs: u64,
}

impl TimeoutsConfig {
    /// The idle timeout, if enabled.
    pub fn idle(&self) -> Option<Duration> {
        (self.idle_secs > 0).then(|| Duration::from_secs(self.idle_secs))
    }
}

fn default_leeway() -> u64 {
    30
}
