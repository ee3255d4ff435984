//! Listener configuration.

use roomcast_proto::HandshakeConfig;
use serde::Deserialize;
use std::net::SocketAddr;

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    pub address: SocketAddr,
}

/// WebSocket endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Path of the per-user notification endpoint (default: "/ws/notify").
    #[serde(default = "default_notify_path")]
    pub notify_path: String,
    /// Path of the room endpoint (default: "/ws").
    #[serde(default = "default_room_path")]
    pub room_path: String,
    /// Query parameter carrying the room id (default: "roomId").
    #[serde(default = "default_room_query_key")]
    pub room_query_key: String,
    /// Allowed origins for CORS (empty = allow all).
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            notify_path: default_notify_path(),
            room_path: default_room_path(),
            room_query_key: default_room_query_key(),
            allow_origins: Vec::new(),
        }
    }
}

impl WebSocketConfig {
    /// Handshake routing policy for the gateway.
    pub fn handshake(&self) -> HandshakeConfig {
        HandshakeConfig {
            notify_path: self.notify_path.clone(),
            room_path: self.room_path.clone(),
            room_query_key: self.room_query_key.clone(),
            allowed_origins: self.allow_origins.clone(),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Address to bind to (e.g., "127.0.0.1:9090").
    pub address: SocketAddr,
    /// Bearer token required on broadcast routes. Unset leaves them open,
    /// which is only sensible on a loopback or private address.
    pub ingress_token: Option<String>,
}

fn default_notify_path() -> String {
    "/ws/notify".to_string()
}

fn default_room_path() -> String {
    "/ws".to_string()
}

fn default_room_query_key() -> String {
    "roomId".to_string()
}
