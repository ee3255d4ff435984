//! Presence tracking: which users are viewing which room.
//!
//! A user is present in at most one room. Presence is transient UI state
//! and is never persisted.

use parking_lot::Mutex;
use roomcast_proto::{RoomId, UserId};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct PresenceTracker {
    rooms: Mutex<HashMap<RoomId, HashSet<UserId>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `user` into `room`, out of every other room.
    ///
    /// Returns the room the user was in before, if it differs.
    pub fn enter(&self, room: RoomId, user: UserId) -> Option<RoomId> {
        let mut rooms = self.rooms.lock();
        let previous = remove_user(&mut rooms, user).into_iter().find(|r| *r != room);
        rooms.entry(room).or_default().insert(user);
        previous
    }

    /// Remove `user` from `room` only.
    pub fn leave(&self, room: RoomId, user: UserId) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(users) = rooms.get_mut(&room) else {
            return false;
        };
        let removed = users.remove(&user);
        if users.is_empty() {
            rooms.remove(&room);
        }
        removed
    }

    /// Remove `user` from all rooms. Returns the rooms they were in.
    pub fn remove_everywhere(&self, user: UserId) -> Vec<RoomId> {
        remove_user(&mut self.rooms.lock(), user)
    }

    /// Users present in `room`, sorted.
    pub fn members(&self, room: RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .rooms
            .lock()
            .get(&room)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    pub fn is_present(&self, room: RoomId, user: UserId) -> bool {
        self.rooms.lock().get(&room).is_some_and(|set| set.contains(&user))
    }

    /// The room `user` is currently in.
    pub fn room_of(&self, user: UserId) -> Option<RoomId> {
        self.rooms
            .lock()
            .iter()
            .find(|(_, users)| users.contains(&user))
            .map(|(room, _)| *room)
    }

    /// Total present users across all rooms.
    pub fn user_count(&self) -> usize {
        self.rooms.lock().values().map(HashSet::len).sum()
    }

    /// Rooms with at least one present user.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

fn remove_user(rooms: &mut HashMap<RoomId, HashSet<UserId>>, user: UserId) -> Vec<RoomId> {
    let mut left = Vec::new();
    rooms.retain(|room, users| {
        if users.remove(&user) {
            left.push(*room);
        }
        !users.is_empty()
    });
    left
}
