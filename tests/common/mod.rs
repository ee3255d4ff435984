//! Integration test common infrastructure.
//!
//! Provides utilities for spawning test servers, creating WebSocket test
//! clients, and minting tokens the server accepts.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;

/// Secret shared by every test server.
pub const JWT_SECRET: &str = "integration-secret";

/// Mint a token for `user_id` the way the chat backend does.
#[allow(dead_code)]
pub fn token(user_id: i64, username: &str) -> String {
    let claims = serde_json::json!({ "user_id": user_id, "username": username });
    roomcast_proto::token::sign(&claims, JWT_SECRET.as_bytes()).expect("sign token")
}
