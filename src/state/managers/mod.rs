//! Domain managers for hub state.
//!
//! Each manager owns one shared structure behind its own lock: the two
//! connection registries and the presence map. No operation holds more than
//! one of these locks, and none holds a lock while delivering.

pub mod lifecycle;
pub mod notify;
pub mod presence;
pub mod room;

use crate::error::DeliveryError;
use crate::state::Connection;
use std::sync::Arc;
use tracing::debug;

/// Result of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    /// Connections whose queue accepted the payload.
    pub delivered: usize,
    /// Connections closed and deregistered because delivery failed.
    pub evicted: usize,
}

impl FanoutReport {
    pub(crate) fn merge(self, other: FanoutReport) -> FanoutReport {
        FanoutReport {
            delivered: self.delivered + other.delivered,
            evicted: self.evicted + other.evicted,
        }
    }
}

/// Deliver to each target independently, collecting the ones that failed.
///
/// A failed target is closed here; the caller deregisters it.
pub(crate) fn deliver(
    scope: &'static str,
    targets: &[Arc<Connection>],
    payload: &roomcast_proto::Payload,
) -> (usize, Vec<(Arc<Connection>, DeliveryError)>) {
    let mut delivered = 0;
    let mut failed = Vec::new();
    for conn in targets {
        match conn.send(payload) {
            Ok(()) => delivered += 1,
            Err(e) => {
                debug!(conn = %conn.id(), user_id = conn.user_id(), scope, error = %e, "delivery failed");
                crate::metrics::record_delivery_failure(scope, e.error_code());
                crate::metrics::record_eviction(e.error_code());
                conn.close();
                failed.push((Arc::clone(conn), e));
            }
        }
    }
    (delivered, failed)
}
