use super::CloseReason;
use crate::state::{Session, UnitOutcome};
use futures_util::{SinkExt, StreamExt};
use roomcast_proto::Payload;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

enum SelectResult {
    /// A text unit from the peer.
    Unit(String),
    /// A frame that only counts as activity (ping, pong, raw frame).
    Activity,
    /// A queued payload to write.
    Outgoing(Payload),
    /// End the loop.
    Break(CloseReason),
}

fn classify_frame(frame: Option<Result<Message, WsError>>) -> SelectResult {
    match frame {
        Some(Ok(Message::Text(text))) => SelectResult::Unit(text),
        Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
            Ok(text) => SelectResult::Unit(text),
            Err(e) => {
                warn!(error = %e, "skipping non-UTF-8 binary frame");
                crate::metrics::record_inbound("invalid_utf8");
                SelectResult::Activity
            }
        },
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => SelectResult::Activity,
        Some(Ok(Message::Close(frame))) => {
            debug!(frame = ?frame, "peer sent close");
            SelectResult::Break(CloseReason::PeerClosed)
        }
        Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
            SelectResult::Break(CloseReason::PeerClosed)
        }
        Some(Err(e)) => {
            debug!(error = %e, "read error");
            SelectResult::Break(CloseReason::TransportError)
        }
    }
}

async fn idle_deadline(timeout: Option<Duration>, last_activity: Instant) {
    match timeout {
        Some(timeout) => tokio::time::sleep_until(last_activity + timeout).await,
        None => std::future::pending().await,
    }
}

/// Drive one socket until something ends it.
pub(super) async fn run(
    ws: &mut WebSocketStream<TcpStream>,
    session: &mut Session,
    outgoing: &mut mpsc::Receiver<Payload>,
    shutdown_rx: &mut broadcast::Receiver<()>,
    idle_timeout: Option<Duration>,
) -> anyhow::Result<CloseReason> {
    let conn = Arc::clone(session.conn());
    let mut last_activity = Instant::now();

    loop {
        let result = tokio::select! {
            frame = ws.next() => classify_frame(frame),
            payload = outgoing.recv() => match payload {
                Some(payload) => SelectResult::Outgoing(payload),
                None => SelectResult::Break(CloseReason::Evicted),
            },
            _ = conn.closed() => SelectResult::Break(CloseReason::Evicted),
            _ = shutdown_rx.recv() => SelectResult::Break(CloseReason::Shutdown),
            _ = idle_deadline(idle_timeout, last_activity) => {
                info!(idle_secs = idle_timeout.map_or(0, |d| d.as_secs()), "idle timeout");
                SelectResult::Break(CloseReason::IdleTimeout)
            }
        };

        match result {
            SelectResult::Unit(text) => {
                last_activity = Instant::now();
                if let UnitOutcome::Closed = session.handle_unit(&text) {
                    return Ok(CloseReason::Evicted);
                }
            }
            SelectResult::Activity => {
                last_activity = Instant::now();
            }
            SelectResult::Outgoing(payload) => {
                ws.send(Message::Text(payload.to_string())).await?;
            }
            SelectResult::Break(reason) => return Ok(reason),
        }
    }
}
