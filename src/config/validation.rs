//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("auth.jwt_secret is required")]
    MissingJwtSecret,
    #[error("websocket.{0} must start with '/', got '{1}'")]
    InvalidPath(&'static str, String),
    #[error("websocket.notify_path and websocket.room_path must differ")]
    PathCollision,
    #[error("limits.{0} must be greater than zero")]
    ZeroCapacity(&'static str),
    #[error("http.address must differ from listen.address")]
    AddressCollision,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::MissingJwtSecret);
    }

    let ws = &config.websocket;
    for (field, path) in [("notify_path", &ws.notify_path), ("room_path", &ws.room_path)] {
        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidPath(field, path.clone()));
        }
    }
    if ws.notify_path == ws.room_path {
        errors.push(ValidationError::PathCollision);
    }

    if config.limits.send_queue == 0 {
        errors.push(ValidationError::ZeroCapacity("send_queue"));
    }
    if config.limits.dispatch_queue == 0 {
        errors.push(ValidationError::ZeroCapacity("dispatch_queue"));
    }

    if let Some(http) = &config.http
        && http.address == config.listen.address
    {
        errors.push(ValidationError::AddressCollision);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
