//! Error types for the wire protocol.
//!
//! A bad unit is dropped and the connection stays open, so every variant
//! carries enough context for a useful log line.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while decoding or validating chat events.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The unit was not valid JSON.
    #[error("malformed unit: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The unit was valid JSON but not an object.
    #[error("unit is not a JSON object")]
    NotAnObject,

    /// A field required by the event kind was absent.
    #[error("missing field `{field}` for `{kind}` event")]
    MissingField {
        /// Event kind the field is required for.
        kind: String,
        /// Wire name of the field.
        field: &'static str,
    },

    /// A field was present but had an unusable value.
    #[error("invalid field `{field}`: {value}")]
    InvalidField {
        /// Wire name of the field.
        field: &'static str,
        /// Rendered offending value.
        value: String,
    },
}

impl ProtocolError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::NotAnObject => "not_an_object",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
        }
    }
}

/// Errors raised while signing or verifying tokens.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The token does not have three base64url segments.
    #[error("malformed token")]
    Malformed,

    /// The header names an algorithm other than HS256.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not match the signing input.
    #[error("bad signature")]
    BadSignature,

    /// The claims segment could not be (de)serialized.
    #[error("invalid claims: {0}")]
    Claims(#[from] serde_json::Error),
}

impl TokenError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::BadSignature => "bad_signature",
            Self::Claims(_) => "invalid_claims",
        }
    }
}
