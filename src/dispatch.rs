//! Broadcast dispatcher.
//!
//! The message-mutation path hands committed chat events to [`Dispatcher`]
//! and returns immediately. A single worker drains a bounded queue and runs
//! each fan-out in submission order, so two events dispatched one after the
//! other reach every receiver in that order.

use crate::error::DispatchError;
use crate::state::{ConnId, Hub};
use crate::telemetry::{DispatchTimer, spans};
use roomcast_proto::{ChatEvent, EventKind, Payload, ProtocolError, RoomId, encode};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Where a dispatched event goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every connection in one room, optionally skipping the sender's own.
    Room { room_id: RoomId, exclude: Option<ConnId> },
    /// Every notify connection.
    Global,
    /// Every room connection in every room.
    AllRooms,
    /// Every notify connection and every room connection, as one job.
    Everywhere,
}

impl Scope {
    pub fn label(&self) -> &'static str {
        match self {
            Scope::Room { .. } => "room",
            Scope::Global => "global",
            Scope::AllRooms => "all_rooms",
            Scope::Everywhere => "everywhere",
        }
    }
}

struct Job {
    scope: Scope,
    kind: EventKind,
    payload: Payload,
    queued_at: Instant,
}

/// Handle for enqueueing broadcasts. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Start the worker. It stops when every handle is dropped or the hub
    /// signals shutdown.
    pub fn spawn(hub: Arc<Hub>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown_rx = hub.lifecycle.subscribe();
        let worker = tokio::spawn(run_worker(hub, rx, shutdown_rx));
        (Self { tx }, worker)
    }

    /// Validate and enqueue `event` without waiting for delivery.
    pub fn dispatch(&self, scope: Scope, event: &ChatEvent) -> Result<(), DispatchError> {
        let result = self.enqueue(scope, event);
        if let Err(e) = &result {
            crate::metrics::record_dispatch_rejected(e.error_code());
        }
        result
    }

    fn enqueue(&self, scope: Scope, event: &ChatEvent) -> Result<(), DispatchError> {
        event.validate()?;
        if let Scope::Room { room_id, .. } = scope
            && event.room_id.is_some_and(|id| id != room_id)
        {
            return Err(ProtocolError::InvalidField {
                field: "roomId",
                value: format!("{:?} (dispatched to room {})", event.room_id, room_id),
            }
            .into());
        }

        let job = Job {
            scope,
            kind: event.kind.clone(),
            payload: encode(event)?,
            queued_at: Instant::now(),
        };
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull,
            TrySendError::Closed(_) => DispatchError::Stopped,
        })
    }
}

async fn run_worker(hub: Arc<Hub>, mut rx: mpsc::Receiver<Job>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => apply(&hub, job),
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }
    info!("dispatcher stopped");
}

fn apply(hub: &Hub, job: Job) {
    let label = job.scope.label();
    let _timer = DispatchTimer::since(label, job.queued_at);
    let _span = spans::dispatch(label, job.kind.as_str()).entered();

    let report = match job.scope {
        Scope::Room { room_id, exclude } => hub.broadcast(room_id, &job.payload, exclude),
        Scope::Global => hub.broadcast_all(&job.payload),
        Scope::AllRooms => hub.broadcast_every_room(&job.payload),
        Scope::Everywhere => hub
            .broadcast_all(&job.payload)
            .merge(hub.broadcast_every_room(&job.payload)),
    };
    debug!(
        kind = %job.kind,
        delivered = report.delivered,
        evicted = report.evicted,
        "dispatch applied"
    );
}
