//! Identity verification for WebSocket upgrades.
//!
//! The chat backend issues HS256 tokens at login; this service only checks
//! them. Everything downstream of the handshake works with an [`Identity`]
//! and never sees the token again.

use crate::config::AuthConfig;
use crate::error::AuthError;
use chrono::Utc;
use roomcast_proto::UserId;
use serde::{Deserialize, Serialize};

/// A pre-validated user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// Turns a bearer token into an identity.
///
/// Called from the handshake callback, before any hub state exists.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Token claims issued by the chat backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "UserID")]
    pub user_id: UserId,
    #[serde(alias = "Username")]
    pub username: String,
    /// Expiry as a Unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// HS256 identity provider sharing a secret with the chat backend.
pub struct JwtIdentityProvider {
    secret: Vec<u8>,
    leeway_secs: i64,
}

impl JwtIdentityProvider {
    pub fn new(secret: impl Into<Vec<u8>>, leeway_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            leeway_secs: i64::try_from(leeway_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.leeway_secs)
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let claims: Claims = roomcast_proto::token::verify(token, &self.secret)?;

        if let Some(exp) = claims.exp
            && exp.saturating_add(self.leeway_secs) < Utc::now().timestamp()
        {
            return Err(AuthError::Expired);
        }
        if claims.user_id <= 0 {
            return Err(AuthError::InvalidUser(claims.user_id));
        }
        if claims.username.trim().is_empty() {
            return Err(AuthError::EmptyName);
        }

        Ok(Identity::new(claims.user_id, claims.username))
    }
}
