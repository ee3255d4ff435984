//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, AuthConfig, TimeoutsConfig)
//! - [`listen`]: Listener configuration (ListenConfig, WebSocketConfig, HttpConfig)
//! - [`limits`]: Queue capacities (LimitsConfig)
//! - [`validation`]: Startup checks for unusable values

mod limits;
mod listen;
mod types;
pub mod validation;

pub use limits::LimitsConfig;
pub use listen::{HttpConfig, ListenConfig, WebSocketConfig};
pub use types::{AuthConfig, Config, ConfigError, ServerConfig, TimeoutsConfig};
