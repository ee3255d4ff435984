//! Room connection registry.
//!
//! Maps each room to the room-scoped connections subscribed to it. A single
//! registry-wide mutex guards the map; it is held for map manipulation only.
//! Fan-out snapshots the target list, releases the lock, then writes.

use super::{FanoutReport, deliver};
use crate::state::{ConnId, Connection};
use parking_lot::Mutex;
use roomcast_proto::{Payload, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Vec<Arc<Connection>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `conn` to `room`. Returns `false` if it was already there
    /// or was opened for a different room.
    pub fn add(&self, room: RoomId, conn: Arc<Connection>) -> bool {
        if conn.room_id() != Some(room) {
            warn!(conn = %conn.id(), room_id = room, route = %conn.route(), "refusing room registration outside the connection's route");
            return false;
        }
        let mut rooms = self.rooms.lock();
        let set = rooms.entry(room).or_default();
        if set.iter().any(|c| c.is(&conn)) {
            return false;
        }
        set.push(conn);
        true
    }

    /// Unsubscribe `conn` from `room`. No-op if absent.
    pub fn remove(&self, room: RoomId, conn: &Connection) -> bool {
        let mut rooms = self.rooms.lock();
        remove_locked(&mut rooms, room, conn)
    }

    /// Deliver `payload` to every connection in `room` except `exclude`.
    ///
    /// Connections whose delivery fails are closed and removed before this
    /// returns.
    pub fn broadcast(&self, room: RoomId, payload: &Payload, exclude: Option<ConnId>) -> FanoutReport {
        let targets: Vec<Arc<Connection>> = {
            let rooms = self.rooms.lock();
            match rooms.get(&room) {
                Some(set) => set
                    .iter()
                    .filter(|c| Some(c.id()) != exclude)
                    .cloned()
                    .collect(),
                None => return FanoutReport::default(),
            }
        };
        self.fan_out("room", &targets, payload)
    }

    /// Deliver `payload` to every room connection in every room.
    pub fn broadcast_every_room(&self, payload: &Payload) -> FanoutReport {
        let targets: Vec<Arc<Connection>> = {
            let rooms = self.rooms.lock();
            rooms.values().flatten().cloned().collect()
        };
        self.fan_out("all_rooms", &targets, payload)
    }

    fn fan_out(&self, scope: &'static str, targets: &[Arc<Connection>], payload: &Payload) -> FanoutReport {
        let (delivered, failed) = deliver(scope, targets, payload);
        if !failed.is_empty() {
            let mut rooms = self.rooms.lock();
            for (conn, error) in &failed {
                if let Some(room) = conn.room_id()
                    && remove_locked(&mut rooms, room, conn)
                {
                    info!(conn = %conn.id(), user_id = conn.user_id(), room_id = room, %error, "evicted room connection");
                }
            }
        }
        FanoutReport {
            delivered,
            evicted: failed.len(),
        }
    }

    /// Snapshot of the connections currently in `room`.
    pub fn members(&self, room: RoomId) -> Vec<Arc<Connection>> {
        self.rooms.lock().get(&room).cloned().unwrap_or_default()
    }

    pub fn contains(&self, room: RoomId, conn: &Connection) -> bool {
        self.rooms
            .lock()
            .get(&room)
            .is_some_and(|set| set.iter().any(|c| c.is(conn)))
    }

    /// Number of connections in `room`.
    pub fn len(&self, room: RoomId) -> usize {
        self.rooms.lock().get(&room).map_or(0, Vec::len)
    }

    /// Rooms with at least one connection.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.lock().values().map(Vec::len).sum()
    }
}

fn remove_locked(rooms: &mut HashMap<RoomId, Vec<Arc<Connection>>>, room: RoomId, conn: &Connection) -> bool {
    let Some(set) = rooms.get_mut(&room) else {
        return false;
    };
    let before = set.len();
    set.retain(|c| !c.is(conn));
    let removed = set.len() != before;
    if set.is_empty() {
        rooms.remove(&room);
    }
    removed
}
