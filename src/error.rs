//! Unified error handling for roomcast.
//!
//! Every error in this crate is scoped to one connection attempt, one
//! delivery, or one dispatch. None of them is allowed to take the process
//! down; the `error_code()` labels feed the failure counters in
//! [`crate::metrics`].

use roomcast_proto::{ProtocolError, TokenError};
use thiserror::Error;

// ============================================================================
// Authentication Errors (pre-upgrade)
// ============================================================================

/// Reasons an identity provider refuses a token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    Token(#[from] TokenError),

    #[error("token expired")]
    Expired,

    #[error("invalid user id {0}")]
    InvalidUser(i64),

    #[error("display name is empty")]
    EmptyName,
}

impl AuthError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Token(e) => e.error_code(),
            Self::Expired => "expired",
            Self::InvalidUser(_) => "invalid_user",
            Self::EmptyName => "empty_name",
        }
    }
}

// ============================================================================
// Delivery Errors (one payload, one connection)
// ============================================================================

/// Failure to hand a payload to a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiver stopped draining its queue.
    #[error("send queue full")]
    QueueFull,

    /// The connection task is gone or the handle was closed.
    #[error("connection closed")]
    Closed,
}

impl DeliveryError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

// ============================================================================
// Dispatch Errors (mutation path -> broadcast worker)
// ============================================================================

/// Reasons a broadcast could not be enqueued.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid event: {0}")]
    Invalid(#[from] ProtocolError),

    #[error("dispatch queue full")]
    QueueFull,

    #[error("dispatcher stopped")]
    Stopped,
}

impl DispatchError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid(e) => e.error_code(),
            Self::QueueFull => "queue_full",
            Self::Stopped => "stopped",
        }
    }
}
