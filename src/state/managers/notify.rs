//! Global notification registry.
//!
//! Each user has at most one notify connection. A new one displaces the old:
//! the stale handle is closed and its entry removed, then the new handle is
//! installed. These are two separate map operations.

use super::{FanoutReport, deliver};
use crate::state::{Connection, DashMapExt};
use dashmap::DashMap;
use roomcast_proto::{Payload, UserId};
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct NotifyRegistry {
    conns: DashMap<UserId, Arc<Connection>>,
}

impl NotifyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close and remove `user`'s entry if it is not `new_conn`.
    pub fn evict_if_stale(&self, user: UserId, new_conn: &Connection) -> Option<Arc<Connection>> {
        let (_, stale) = self.conns.remove_if(&user, |_, c| !c.is(new_conn))?;
        stale.close();
        crate::metrics::record_eviction("replaced");
        info!(conn = %stale.id(), user_id = user, replaced_by = %new_conn.id(), "evicted stale notify connection");
        Some(stale)
    }

    /// Install `conn` as `user`'s notify connection.
    ///
    /// A different connection still present here (a concurrent connect that
    /// won the race past [`evict_if_stale`](Self::evict_if_stale)) is closed.
    pub fn store(&self, user: UserId, conn: Arc<Connection>) {
        let new_id = conn.id();
        if let Some(previous) = self.conns.insert(user, conn)
            && previous.id() != new_id
        {
            previous.close();
            crate::metrics::record_eviction("replaced");
            info!(conn = %previous.id(), user_id = user, replaced_by = %new_id, "replaced notify connection");
        }
    }

    /// Remove whichever entry maps to `conn`, whatever its key.
    pub fn remove(&self, conn: &Connection) -> bool {
        let Some(user) = self.conns.find_key(|c| c.is(conn)) else {
            return false;
        };
        self.conns.remove_if(&user, |_, c| c.is(conn)).is_some()
    }

    /// The user's current notify connection.
    pub fn get(&self, user: UserId) -> Option<Arc<Connection>> {
        self.conns.get(&user).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Deliver `payload` to every notify connection.
    ///
    /// A failed delivery closes the connection and drops its entry, the same
    /// policy as room fan-out.
    pub fn broadcast_all(&self, payload: &Payload) -> FanoutReport {
        let targets = self.conns.values_cloned();
        let (delivered, failed) = deliver("global", &targets, payload);
        for (conn, error) in &failed {
            if self.conns.remove_if(&conn.user_id(), |_, c| c.is(conn)).is_some() {
                info!(conn = %conn.id(), user_id = conn.user_id(), %error, "evicted notify connection");
            }
        }
        FanoutReport {
            delivered,
            evicted: failed.len(),
        }
    }
}
