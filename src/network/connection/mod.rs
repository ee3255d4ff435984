//! Connection - drives one accepted WebSocket.
//!
//! Each Connection runs in its own Tokio task:
//!
//! ```text
//!    ┌──────────────────────────────────────────────────────┐
//!    │                  Connection Task                     │
//!    │                                                      │
//!    │   WebSocket read ──┐            ┌──► WebSocket write │
//!    │                    ▼            │                    │
//!    │              tokio::select! ────┘                    │
//!    │               ▲   ▲   ▲   ▲                          │
//!    │   send queue ─┘   │   │   └─ idle deadline           │
//!    │   eviction token ─┘   └─ shutdown broadcast          │
//!    └──────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound units go to the [`Session`]; outbound payloads come from the
//! connection's queue, filled by broadcasts on other tasks. The session is
//! owned by the task, so its teardown runs however the task ends.

mod event_loop;

use crate::auth::Identity;
use crate::error::AuthError;
use crate::state::{Hub, Session};
use crate::telemetry::spans;
use roomcast_proto::{Payload, Route};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{Instrument, info};

/// Why a connection task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the socket or the stream ended.
    PeerClosed,
    /// Reading or writing the socket failed.
    TransportError,
    /// The hub closed the handle (replaced or failed delivery).
    Evicted,
    /// The server is shutting down.
    Shutdown,
    /// No inbound frame within the idle timeout.
    IdleTimeout,
}

impl CloseReason {
    fn close_frame(self) -> Option<CloseFrame<'static>> {
        let (code, reason) = match self {
            Self::PeerClosed | Self::TransportError => return None,
            Self::Evicted => (CloseCode::Policy, "connection replaced"),
            Self::Shutdown => (CloseCode::Away, "server shutting down"),
            Self::IdleTimeout => (CloseCode::Away, "idle timeout"),
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PeerClosed => "peer_closed",
            Self::TransportError => "transport_error",
            Self::Evicted => "evicted",
            Self::Shutdown => "shutdown",
            Self::IdleTimeout => "idle_timeout",
        };
        f.write_str(s)
    }
}

/// A registered WebSocket connection and its session.
pub struct Connection {
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    session: Session,
    outgoing: mpsc::Receiver<Payload>,
    shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    idle_timeout: Option<Duration>,
}

impl Connection {
    /// Register the upgraded socket with the hub.
    pub fn open(
        hub: Arc<Hub>,
        ws: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        identity: &Identity,
        route: Route,
        idle_timeout: Option<Duration>,
    ) -> Result<Self, AuthError> {
        let shutdown_rx = hub.lifecycle.subscribe();
        let (session, outgoing) = Session::open(hub, identity, route)?;
        Ok(Self {
            ws,
            addr,
            session,
            outgoing,
            shutdown_rx,
            idle_timeout,
        })
    }

    /// Serve the socket until it closes, then tear down.
    pub async fn run(mut self) -> anyhow::Result<CloseReason> {
        let conn = Arc::clone(self.session.conn());
        let span = spans::connection(conn.id(), conn.user_id(), conn.route());

        async move {
            info!(addr = %self.addr, "connection active");
            let outcome = event_loop::run(
                &mut self.ws,
                &mut self.session,
                &mut self.outgoing,
                &mut self.shutdown_rx,
                self.idle_timeout,
            )
            .await;

            self.session.close();

            let reason = match &outcome {
                Ok(reason) => *reason,
                Err(_) => CloseReason::TransportError,
            };
            let _ = self.ws.close(reason.close_frame()).await;
            info!(addr = %self.addr, %reason, "connection ended");
            outcome
        }
        .instrument(span)
        .await
    }
}
