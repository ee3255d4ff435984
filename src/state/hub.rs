//! The Hub: shared presence and delivery state.
//!
//! Built once at startup and handed out as `Arc<Hub>` to the gateway, every
//! connection task, the dispatcher, and the HTTP surface.

use crate::auth::Identity;
use crate::config::Config;
use crate::state::managers::FanoutReport;
use crate::state::managers::lifecycle::LifecycleManager;
use crate::state::managers::notify::NotifyRegistry;
use crate::state::managers::presence::PresenceTracker;
use crate::state::managers::room::RoomRegistry;
use crate::state::{ConnId, ConnIdGenerator, Connection};
use roomcast_proto::{Payload, PresenceAction, PresenceRequest, RoomId, Route, UserId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Hub settings derived from the config file.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound queue capacity per connection.
    pub send_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { send_queue: 64 }
    }
}

impl From<&Config> for HubConfig {
    fn from(config: &Config) -> Self {
        Self {
            send_queue: config.limits.send_queue,
        }
    }
}

/// What a presence request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceOutcome {
    Entered { room_id: RoomId, previous: Option<RoomId> },
    Left { room_id: RoomId, was_present: bool },
    /// Unknown or missing action; presence unchanged.
    Ignored,
}

/// Counts reported on `/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub rooms: usize,
    pub room_connections: usize,
    pub notify_connections: usize,
    pub present_users: usize,
}

/// One room as reported on `/rooms/:room_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub connections: usize,
    pub present: Vec<UserId>,
}

pub struct Hub {
    pub rooms: RoomRegistry,
    pub notify: NotifyRegistry,
    pub presence: PresenceTracker,
    pub lifecycle: LifecycleManager,
    conn_ids: ConnIdGenerator,
    config: HubConfig,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            notify: NotifyRegistry::new(),
            presence: PresenceTracker::new(),
            lifecycle: LifecycleManager::new(),
            conn_ids: ConnIdGenerator::new(),
            config,
        }
    }

    /// Register a freshly upgraded, authenticated connection.
    ///
    /// Notify connections displace the user's previous one; room connections
    /// join their room's registry.
    pub fn on_connect(&self, identity: &Identity, route: Route) -> (Arc<Connection>, mpsc::Receiver<Payload>) {
        let (conn, rx) = Connection::new(self.conn_ids.next(), identity, route, self.config.send_queue);

        match route {
            Route::Notify => {
                self.notify.evict_if_stale(identity.user_id, &conn);
                self.notify.store(identity.user_id, Arc::clone(&conn));
            }
            Route::Room(room_id) => {
                self.rooms.add(room_id, Arc::clone(&conn));
            }
        }

        crate::metrics::connection_opened(conn.kind());
        info!(conn = %conn.id(), user_id = identity.user_id, name = %conn.display_name(), %route, "connection registered");
        (conn, rx)
    }

    /// Tear down a connection's hub state. Safe to call any number of times;
    /// only the first call does anything.
    pub fn on_disconnect(&self, conn: &Connection) -> bool {
        if !conn.begin_teardown() {
            return false;
        }

        match conn.route() {
            Route::Notify => {
                self.notify.remove(conn);
                // A displaced connection must not wipe its successor's presence.
                let superseded = self
                    .notify
                    .get(conn.user_id())
                    .is_some_and(|current| !current.is(conn));
                if !superseded {
                    let left = self.presence.remove_everywhere(conn.user_id());
                    if !left.is_empty() {
                        debug!(user_id = conn.user_id(), rooms = ?left, "presence cleared");
                        crate::metrics::set_present_users(self.presence.user_count());
                    }
                }
            }
            Route::Room(room_id) => {
                self.rooms.remove(room_id, conn);
            }
        }

        conn.close();
        crate::metrics::connection_closed(conn.kind());
        info!(conn = %conn.id(), user_id = conn.user_id(), route = %conn.route(), "connection closed");
        true
    }

    /// Room-scoped fan-out.
    pub fn broadcast(&self, room_id: RoomId, payload: &Payload, exclude: Option<ConnId>) -> FanoutReport {
        let report = self.rooms.broadcast(room_id, payload, exclude);
        crate::metrics::record_broadcast("room", report.delivered);
        report
    }

    /// Fan-out to every notify connection.
    pub fn broadcast_all(&self, payload: &Payload) -> FanoutReport {
        let report = self.notify.broadcast_all(payload);
        crate::metrics::record_broadcast("global", report.delivered);
        report
    }

    /// Fan-out to every room connection in every room.
    pub fn broadcast_every_room(&self, payload: &Payload) -> FanoutReport {
        let report = self.rooms.broadcast_every_room(payload);
        crate::metrics::record_broadcast("all_rooms", report.delivered);
        report
    }

    /// Apply a presence request from `user`.
    pub fn apply_presence(&self, user: UserId, request: &PresenceRequest) -> PresenceOutcome {
        let room_id = request.room_id;
        let outcome = match &request.action {
            Some(PresenceAction::Enter) => PresenceOutcome::Entered {
                room_id,
                previous: self.presence.enter(room_id, user),
            },
            Some(PresenceAction::Leave) => PresenceOutcome::Left {
                room_id,
                was_present: self.presence.leave(room_id, user),
            },
            _ => return PresenceOutcome::Ignored,
        };
        crate::metrics::set_present_users(self.presence.user_count());
        outcome
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.rooms.room_count(),
            room_connections: self.rooms.connection_count(),
            notify_connections: self.notify.len(),
            present_users: self.presence.user_count(),
        }
    }

    pub fn room_snapshot(&self, room_id: RoomId) -> RoomSnapshot {
        RoomSnapshot {
            room_id,
            connections: self.rooms.len(room_id),
            present: self.presence.members(room_id),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
