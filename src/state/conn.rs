//! Connection handles and their process-unique identifiers.

use crate::auth::Identity;
use crate::error::DeliveryError;
use roomcast_proto::{Payload, RoomId, Route, UserId};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Process-unique connection identifier.
///
/// Registries compare connections by this id, never by user or room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates connection ids.
///
/// Ids start at 1 and are never reused within a process.
pub struct ConnIdGenerator {
    counter: AtomicU64,
}

impl ConnIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }

    /// Generate the next unique id.
    pub fn next(&self) -> ConnId {
        ConnId(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One live WebSocket stream as seen by the registries.
///
/// Sending never blocks: payloads go onto a bounded queue drained by the
/// connection's own task. Closing cancels a token that task selects on, so
/// any task can end a connection without touching its socket.
pub struct Connection {
    id: ConnId,
    user_id: UserId,
    display_name: String,
    route: Route,
    tx: mpsc::Sender<Payload>,
    closed: CancellationToken,
    torn_down: AtomicBool,
}

impl Connection {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(
        id: ConnId,
        identity: &Identity,
        route: Route,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id,
            user_id: identity.user_id,
            display_name: identity.display_name.clone(),
            route,
            tx,
            closed: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
        });
        (conn, rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn route(&self) -> Route {
        self.route
    }

    /// Room this connection was opened for, if room-scoped.
    pub fn room_id(&self) -> Option<RoomId> {
        match self.route {
            Route::Room(room_id) => Some(room_id),
            Route::Notify => None,
        }
    }

    /// Label used for connection metrics.
    pub fn kind(&self) -> &'static str {
        match self.route {
            Route::Notify => "notify",
            Route::Room(_) => "room",
        }
    }

    /// Queue `payload` for delivery without waiting.
    pub fn send(&self, payload: &Payload) -> Result<(), DeliveryError> {
        if self.closed.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        match self.tx.try_send(Payload::clone(payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Ask the owning task to close the transport.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Returns `true` exactly once, for the first caller.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    /// Identity comparison.
    pub fn is(&self, other: &Connection) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("route", &self.route)
            .field("closed", &self.is_closed())
            .finish()
    }
}
