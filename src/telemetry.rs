//! Telemetry utilities for dispatch timing and span construction.

use std::time::Instant;

/// Guard timing one dispatch from enqueue to completed fan-out.
///
/// Records the latency when dropped.
pub struct DispatchTimer {
    scope: &'static str,
    start: Instant,
}

impl DispatchTimer {
    /// Start timing at `start`, normally the instant the dispatch was queued.
    pub fn since(scope: &'static str, start: Instant) -> Self {
        Self { scope, start }
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_dispatch(self.scope, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use crate::state::ConnId;
    use roomcast_proto::{Route, UserId};
    use std::net::SocketAddr;
    use tracing::{Span, info_span};

    /// Span for one accepted WebSocket connection.
    pub fn connection(conn: ConnId, user_id: UserId, route: Route) -> Span {
        info_span!("connection", conn = %conn, user_id, route = %route)
    }

    /// Span for an upgrade handshake that has not produced a connection yet.
    pub fn handshake(addr: SocketAddr) -> Span {
        info_span!("handshake", %addr)
    }

    /// Span for one dispatched broadcast.
    pub fn dispatch(scope: &'static str, kind: &str) -> Span {
        info_span!("dispatch", scope, kind = %kind)
    }
}
