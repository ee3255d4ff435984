//! State management module.
//!
//! Contains the Hub (shared registries and presence) and the per-connection
//! entities it tracks.

mod conn;
mod dashmap_ext;
mod hub;
pub mod managers;
mod session;

pub use conn::{ConnId, ConnIdGenerator, Connection};
pub use dashmap_ext::DashMapExt;
pub use hub::{Hub, HubConfig, HubStats, PresenceOutcome, RoomSnapshot};
pub use session::{Session, SessionState, UnitOutcome};
