//! Per-connection session lifecycle.
//!
//! ```text
//! ┌──────────────┐   Session::open   ┌──────────┐   close / drop   ┌──────────┐
//! │  Connecting  ├──────────────────►│  Active  ├─────────────────►│  Closed  │
//! └──────────────┘  (registered)     └────┬─────┘  (exactly once)  └──────────┘
//!                                         │ handle_unit
//!                                         ├──► notify: presence / broadcast_all
//!                                         └──► room: relay to room peers
//! ```
//!
//! A `Session` owns its connection's hub registration. Dropping it runs the
//! teardown, so the registries are cleaned up however the owning task ends:
//! a read error, a clean close, an eviction, or the task being aborted.

use crate::auth::Identity;
use crate::error::AuthError;
use crate::state::hub::PresenceOutcome;
use crate::state::managers::FanoutReport;
use crate::state::{Connection, Hub};
use roomcast_proto::{EventKind, InboundUnit, Payload, RoomId, Route};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// Result of handling one inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Parsed and forwarded verbatim to every notify connection.
    Forwarded {
        presence: Option<PresenceOutcome>,
        fanout: FanoutReport,
    },
    /// Relayed verbatim to the other connections in the sender's room.
    Relayed { fanout: FanoutReport },
    /// Could not be parsed, or a presence unit without a usable room id.
    Malformed { reason: &'static str },
    /// Keepalive on a room connection; nothing to relay.
    Ignored,
    /// The session is no longer active.
    Closed,
}

pub struct Session {
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    state: SessionState,
}

impl Session {
    /// Register an authenticated connection and enter `Active`.
    ///
    /// An unusable identity fails here, before anything is registered.
    pub fn open(hub: Arc<Hub>, identity: &Identity, route: Route) -> Result<(Self, mpsc::Receiver<Payload>), AuthError> {
        if identity.user_id <= 0 {
            return Err(AuthError::InvalidUser(identity.user_id));
        }
        if identity.display_name.trim().is_empty() {
            return Err(AuthError::EmptyName);
        }

        let (conn, rx) = hub.on_connect(identity, route);
        let mut session = Self {
            hub,
            conn,
            state: SessionState::Connecting,
        };
        session.transition(SessionState::Active);
        Ok((session, rx))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Handle one inbound text unit.
    ///
    /// Notify units drive presence and go to every notify connection. Room
    /// units (read receipts and the like) go to the rest of the room.
    pub fn handle_unit(&mut self, raw: &str) -> UnitOutcome {
        if self.state != SessionState::Active {
            return UnitOutcome::Closed;
        }

        let unit = match InboundUnit::parse(raw) {
            Ok(unit) => unit,
            Err(e) => {
                warn!(conn = %self.conn.id(), user_id = self.conn.user_id(), error = %e, "skipping malformed unit");
                crate::metrics::record_inbound(e.error_code());
                return UnitOutcome::Malformed {
                    reason: e.error_code(),
                };
            }
        };

        match self.conn.route() {
            Route::Notify => self.forward(unit),
            Route::Room(room_id) => self.relay(room_id, unit),
        }
    }

    fn forward(&self, unit: InboundUnit) -> UnitOutcome {
        let user_id = self.conn.user_id();
        let presence = unit.presence().map(|request| {
            let outcome = self.hub.apply_presence(user_id, request);
            match &outcome {
                PresenceOutcome::Entered { room_id, previous } => {
                    debug!(user_id, room_id, previous = ?previous, "presence enter");
                }
                PresenceOutcome::Left { room_id, was_present } => {
                    debug!(user_id, room_id, was_present, "presence leave");
                }
                PresenceOutcome::Ignored => {
                    info!(
                        user_id,
                        room_id = request.room_id,
                        action = ?request.action.as_ref().map(|a| a.as_str()),
                        "ignoring unknown presence action"
                    );
                }
            }
            outcome
        });

        let fanout = self.hub.broadcast_all(&unit.into_payload());
        crate::metrics::record_inbound("forwarded");
        UnitOutcome::Forwarded { presence, fanout }
    }

    fn relay(&self, room_id: RoomId, unit: InboundUnit) -> UnitOutcome {
        if unit.kind() == Some(&EventKind::Ping) {
            crate::metrics::record_inbound("ignored");
            return UnitOutcome::Ignored;
        }

        let kind = unit.kind().map(|k| k.to_string());
        let fanout = self
            .hub
            .broadcast(room_id, &unit.into_payload(), Some(self.conn.id()));
        debug!(
            conn = %self.conn.id(),
            room_id,
            kind = kind.as_deref().unwrap_or("-"),
            delivered = fanout.delivered,
            "relayed room unit"
        );
        crate::metrics::record_inbound("relayed");
        UnitOutcome::Relayed { fanout }
    }

    /// Enter `Closed`, tearing down hub state. Later calls do nothing.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.transition(SessionState::Closed);
        self.hub.on_disconnect(&self.conn);
    }

    fn transition(&mut self, next: SessionState) {
        debug!(conn = %self.conn.id(), from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HubConfig;

    fn hub() -> Arc<Hub> {
        Arc::new(Hub::new(HubConfig { send_queue: 16 }))
    }

    fn notify(hub: &Arc<Hub>, user: i64) -> (Session, mpsc::Receiver<Payload>) {
        Session::open(Arc::clone(hub), &Identity::new(user, format!("user{user}")), Route::Notify).unwrap()
    }

    #[test]
    fn test_open_rejects_invalid_identity_without_state() {
        let hub = hub();
        let err = Session::open(Arc::clone(&hub), &Identity::new(0, "x"), Route::Notify);
        assert!(matches!(err, Err(AuthError::InvalidUser(0))));
        let err = Session::open(Arc::clone(&hub), &Identity::new(4, ""), Route::Notify);
        assert!(matches!(err, Err(AuthError::EmptyName)));
        assert_eq!(hub.stats().notify_connections, 0);
    }

    #[test]
    fn test_presence_scenario_enter_then_move() {
        let hub = hub();
        let (mut session, _rx) = notify(&hub, 7);
        assert_eq!(session.state(), SessionState::Active);

        session.handle_unit(r#"{"type":"presence","roomId":3,"action":"enter","userId":7}"#);
        session.handle_unit(r#"{"type":"presence","roomId":5.0,"action":"enter","userId":7}"#);

        assert!(!hub.room_snapshot(3).present.contains(&7));
        assert!(hub.room_snapshot(5).present.contains(&7));
    }

    #[test]
    fn test_units_forwarded_verbatim_to_all_notify_connections() {
        let hub = hub();
        let (mut alice, mut alice_rx) = notify(&hub, 7);
        let (_bob, mut bob_rx) = notify(&hub, 8);

        let raw = r#"{"type":"stamp","roomId":3,"extra":true}"#;
        let outcome = alice.handle_unit(raw);
        assert_eq!(
            outcome,
            UnitOutcome::Forwarded {
                presence: None,
                fanout: FanoutReport { delivered: 2, evicted: 0 },
            }
        );
        assert_eq!(&*bob_rx.try_recv().unwrap(), raw);
        assert_eq!(&*alice_rx.try_recv().unwrap(), raw);
    }

    #[test]
    fn test_malformed_units_are_skipped() {
        let hub = hub();
        let (mut session, mut rx) = notify(&hub, 7);

        assert!(matches!(session.handle_unit("not json"), UnitOutcome::Malformed { .. }));
        assert!(matches!(session.handle_unit("[1,2]"), UnitOutcome::Malformed { .. }));
        assert!(matches!(
            session.handle_unit(r#"{"type":"presence","action":"enter"}"#),
            UnitOutcome::Malformed { reason: "missing_field" }
        ));
        assert!(matches!(
            session.handle_unit(r#"{"type":"presence","roomId":"three","action":"enter"}"#),
            UnitOutcome::Malformed { .. }
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(hub.stats().present_users, 0);
    }

    #[test]
    fn test_unknown_presence_action_still_forwarded() {
        let hub = hub();
        let (mut session, mut rx) = notify(&hub, 7);
        let outcome = session.handle_unit(r#"{"type":"presence","roomId":3,"action":"typing"}"#);
        assert!(matches!(
            outcome,
            UnitOutcome::Forwarded { presence: Some(PresenceOutcome::Ignored), .. }
        ));
        assert!(rx.try_recv().is_ok());
        assert_eq!(hub.stats().present_users, 0);
    }

    #[test]
    fn test_close_runs_once_and_drop_cleans_up() {
        let hub = hub();
        let (mut session, _rx) = notify(&hub, 7);
        session.handle_unit(r#"{"type":"presence","roomId":3,"action":"enter"}"#);

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.handle_unit("{}"), UnitOutcome::Closed);
        assert_eq!(hub.stats().present_users, 0);
        assert_eq!(hub.stats().notify_connections, 0);

        let (dropped, _rx2) = notify(&hub, 8);
        assert_eq!(hub.stats().notify_connections, 1);
        drop(dropped);
        assert_eq!(hub.stats().notify_connections, 0);
    }

    fn room(hub: &Arc<Hub>, user: i64, room_id: i64) -> (Session, mpsc::Receiver<Payload>) {
        Session::open(Arc::clone(hub), &Identity::new(user, format!("user{user}")), Route::Room(room_id)).unwrap()
    }

    #[test]
    fn test_room_read_receipt_reaches_peers_not_sender() {
        let hub = hub();
        let (mut reader, mut reader_rx) = room(&hub, 8, 3);
        let (_author, mut author_rx) = room(&hub, 7, 3);
        let (_elsewhere, mut elsewhere_rx) = room(&hub, 9, 4);
        let (_notify, mut notify_rx) = notify(&hub, 7);

        let raw = r#"{"type":"read","roomId":3,"userId":8,"client_id":"c-1","messageId":12}"#;
        let outcome = reader.handle_unit(raw);

        assert_eq!(
            outcome,
            UnitOutcome::Relayed {
                fanout: FanoutReport { delivered: 1, evicted: 0 },
            }
        );
        assert_eq!(&*author_rx.try_recv().unwrap(), raw);
        assert!(reader_rx.try_recv().is_err());
        assert!(elsewhere_rx.try_recv().is_err());
        assert!(notify_rx.try_recv().is_err());
    }

    #[test]
    fn test_room_ping_and_malformed_units_are_not_relayed() {
        let hub = hub();
        let (mut sender, _rx) = room(&hub, 8, 3);
        let (_peer, mut peer_rx) = room(&hub, 7, 3);

        assert_eq!(sender.handle_unit(r#"{"type":"ping"}"#), UnitOutcome::Ignored);
        assert!(matches!(sender.handle_unit("not json"), UnitOutcome::Malformed { .. }));
        assert!(peer_rx.try_recv().is_err());
        assert_eq!(sender.state(), SessionState::Active);
    }

    #[test]
    fn test_room_session_deregisters_on_drop() {
        let hub = hub();
        let (session, _rx) = room(&hub, 7, 3);
        assert_eq!(hub.room_snapshot(3).connections, 1);

        drop(session);
        assert_eq!(hub.room_snapshot(3).connections, 0);
    }

    #[tokio::test]
    async fn test_aborted_task_still_tears_down() {
        let hub = hub();
        let (session, _rx) = notify(&hub, 7);
        let task = tokio::spawn(async move {
            let _session = session;
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        assert_eq!(hub.stats().notify_connections, 1);

        task.abort();
        let _ = task.await;
        assert_eq!(hub.stats().notify_connections, 0);
    }
}
