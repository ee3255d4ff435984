//! WebSocket upgrade routing.
//!
//! Decides, from the HTTP upgrade request alone, which kind of connection is
//! being opened and which bearer token authenticates it. Browsers cannot set
//! headers on a WebSocket upgrade, so the token travels as the offered
//! subprotocol and must be echoed back for the handshake to complete.

use crate::event::RoomId;
use std::fmt;
use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};

/// Header carrying the offered subprotocols.
pub const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

/// Routing and origin policy for upgrade requests.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Path of the per-user notification endpoint.
    pub notify_path: String,
    /// Path of the room-scoped endpoint.
    pub room_path: String,
    /// Query parameter naming the room on `room_path`.
    pub room_query_key: String,
    /// Allowed `Origin` values; empty allows all, `*` matches anything.
    pub allowed_origins: Vec<String>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            notify_path: "/ws/notify".to_string(),
            room_path: "/ws".to_string(),
            room_query_key: "roomId".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Kind of connection an upgrade request opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The user's single notification stream.
    Notify,
    /// A stream subscribed to one room.
    Room(RoomId),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Notify => write!(f, "notify"),
            Route::Room(room_id) => write!(f, "room:{}", room_id),
        }
    }
}

/// A routed, not yet authenticated, upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Where the connection goes.
    pub route: Route,
    /// Bearer token to hand to the identity provider.
    pub token: String,
    /// Subprotocol to echo back, when the token came in as one.
    pub subprotocol: Option<String>,
    /// Client origin, if sent.
    pub origin: Option<String>,
}

impl UpgradeRequest {
    /// Add the negotiated subprotocol to an accepting handshake response.
    pub fn accept(&self, mut response: Response) -> Response {
        if let Some(value) = self
            .subprotocol
            .as_deref()
            .and_then(|proto| HeaderValue::from_str(proto).ok())
        {
            response.headers_mut().insert(SUBPROTOCOL_HEADER, value);
        }
        response
    }
}

/// Reasons an upgrade request is refused before any state is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HandshakeRejection {
    /// The path is neither endpoint.
    #[error("no endpoint at {0}")]
    UnknownPath(String),

    /// The room endpoint was hit without a room id.
    #[error("room id is required")]
    MissingRoomId,

    /// The room id was not a positive integer.
    #[error("room id must be a positive integer, got {0:?}")]
    InvalidRoomId(String),

    /// The origin is not in the allow-list.
    #[error("origin {0:?} not allowed")]
    OriginNotAllowed(String),

    /// No bearer token was offered.
    #[error("missing credentials")]
    MissingToken,

    /// The identity provider refused the token.
    #[error("unauthorized")]
    Unauthorized,
}

impl HandshakeRejection {
    /// HTTP status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownPath(_) => StatusCode::NOT_FOUND,
            Self::MissingRoomId | Self::InvalidRoomId(_) => StatusCode::BAD_REQUEST,
            Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::MissingToken | Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownPath(_) => "unknown_path",
            Self::MissingRoomId => "missing_room_id",
            Self::InvalidRoomId(_) => "invalid_room_id",
            Self::OriginNotAllowed(_) => "origin_not_allowed",
            Self::MissingToken => "missing_token",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Build the HTTP error response for a refused handshake.
    pub fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = self.status();
        response
    }
}

/// Route an upgrade request and extract its credentials.
pub fn route_request(
    req: &Request,
    config: &HandshakeConfig,
) -> Result<UpgradeRequest, HandshakeRejection> {
    let path = req.uri().path();
    let route = if path == config.notify_path {
        Route::Notify
    } else if path == config.room_path {
        let raw = query_param(req.uri().query(), &config.room_query_key)
            .ok_or(HandshakeRejection::MissingRoomId)?;
        match raw.parse::<RoomId>() {
            Ok(room_id) if room_id > 0 => Route::Room(room_id),
            _ => return Err(HandshakeRejection::InvalidRoomId(raw.to_string())),
        }
    } else {
        return Err(HandshakeRejection::UnknownPath(path.to_string()));
    };

    let origin = req
        .headers()
        .get("Origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(origin_value) = &origin {
        let allowed = config.allowed_origins.is_empty()
            || config
                .allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed == origin_value);
        if !allowed {
            return Err(HandshakeRejection::OriginNotAllowed(origin_value.clone()));
        }
    }

    let (token, subprotocol) = if let Some(proto) = offered_subprotocol(req) {
        (proto.clone(), Some(proto))
    } else if let Some(bearer) = bearer_token(req) {
        (bearer, None)
    } else {
        return Err(HandshakeRejection::MissingToken);
    };

    Ok(UpgradeRequest {
        route,
        token,
        subprotocol,
        origin,
    })
}

fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn offered_subprotocol(req: &Request) -> Option<String> {
    req.headers()
        .get_all(SUBPROTOCOL_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .find(|p| !p.is_empty())
        .map(str::to_string)
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
