//! # roomcast-proto
//!
//! Wire-level building blocks for the roomcast presence service.
//!
//! ## Features
//!
//! - Chat event model with per-kind validation
//! - Parsing of inbound notify units (presence requests)
//! - WebSocket upgrade routing and rejection mapping
//! - HS256 compact tokens for identity claims
//!
//! ## Quick Start
//!
//! ```rust
//! use roomcast_proto::{ChatEvent, encode};
//!
//! let event = ChatEvent::deleted(3, "abc", 7, "alice");
//! event.validate().expect("deleted events carry a room and client id");
//! let payload = encode(&event).expect("events always serialize");
//! assert!(payload.contains("\"type\":\"deleted\""));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod token;
#[cfg(feature = "tokio")]
pub mod websocket;

pub use error::{ProtocolError, TokenError};
pub use event::{
    encode, ChatEvent, EventKind, InboundUnit, Payload, PresenceAction, PresenceRequest,
    ReplyTo, RoomId, UserId,
};
#[cfg(feature = "tokio")]
pub use websocket::{route_request, HandshakeConfig, HandshakeRejection, Route, UpgradeRequest};
