//! Prometheus metrics collection for roomcast.
//!
//! Exposed on the HTTP surface at `/metrics`. Every helper is a no-op until
//! [`init`] has run, so unit tests exercising the hub never need a registry.
//!
//! ## Presence and Fan-out Metrics
//!
//! - `roomcast_connections{kind}` - Live connections by kind (notify/room)
//! - `roomcast_present_users` - Users currently present in some room
//! - `roomcast_broadcasts_total{scope}` - Broadcasts by scope (room/global/all_rooms/everywhere)
//! - `roomcast_fanout` - Recipients per broadcast
//! - `roomcast_delivery_failures_total{scope,reason}` - Failed deliveries
//! - `roomcast_evictions_total{reason}` - Connections closed by the hub
//! - `roomcast_inbound_units_total{outcome}` - Notify units by outcome
//! - `roomcast_auth_failures_total{reason}` - Refused upgrades
//! - `roomcast_dispatch_duration_seconds{scope}` - Queue-to-fan-out latency

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Live connections by kind.
pub static CONNECTIONS: OnceLock<IntGaugeVec> = OnceLock::new();

/// Users currently present in a room.
pub static PRESENT_USERS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Broadcasts by scope.
pub static BROADCASTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Failed deliveries by scope and reason.
pub static DELIVERY_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Connections closed by the hub (failed delivery or replaced notify stream).
pub static EVICTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Inbound notify units by outcome.
pub static INBOUND_UNITS: OnceLock<IntCounterVec> = OnceLock::new();

/// Refused upgrades by reason.
pub static AUTH_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Dispatches refused at the ingress by reason.
pub static DISPATCH_REJECTED: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Recipients per broadcast.
pub static FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Time from enqueue to completed fan-out.
pub static DISPATCH_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(metric = stringify!($metric), error = %e, "Failed to register metric");
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(metric = stringify!($metric), error = %e, "Failed to create metric");
                }
            }
        };
    }

    register!(CONNECTIONS, IntGaugeVec::new(Opts::new("roomcast_connections", "Live connections by kind"), &["kind"]));
    register!(PRESENT_USERS, IntGauge::new("roomcast_present_users", "Users currently present in a room"));
    register!(BROADCASTS, IntCounterVec::new(Opts::new("roomcast_broadcasts_total", "Broadcasts by scope"), &["scope"]));
    register!(DELIVERY_FAILURES, IntCounterVec::new(Opts::new("roomcast_delivery_failures_total", "Failed deliveries by scope and reason"), &["scope", "reason"]));
    register!(EVICTIONS, IntCounterVec::new(Opts::new("roomcast_evictions_total", "Connections closed by the hub"), &["reason"]));
    register!(INBOUND_UNITS, IntCounterVec::new(Opts::new("roomcast_inbound_units_total", "Inbound notify units by outcome"), &["outcome"]));
    register!(AUTH_FAILURES, IntCounterVec::new(Opts::new("roomcast_auth_failures_total", "Refused WebSocket upgrades"), &["reason"]));
    register!(DISPATCH_REJECTED, IntCounterVec::new(Opts::new("roomcast_dispatch_rejected_total", "Broadcasts refused at the ingress"), &["reason"]));
    register!(FANOUT, Histogram::with_opts(
        HistogramOpts::new("roomcast_fanout", "Recipients per broadcast")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])));
    register!(DISPATCH_LATENCY, HistogramVec::new(
        HistogramOpts::new("roomcast_dispatch_duration_seconds", "Time from enqueue to completed fan-out")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["scope"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

fn inc(metric: &OnceLock<IntCounterVec>, labels: &[&str]) {
    if let Some(c) = metric.get() {
        c.with_label_values(labels).inc();
    }
}

/// A connection of `kind` was registered.
#[inline]
pub fn connection_opened(kind: &str) {
    if let Some(g) = CONNECTIONS.get() {
        g.with_label_values(&[kind]).inc();
    }
}

/// A connection of `kind` was torn down.
#[inline]
pub fn connection_closed(kind: &str) {
    if let Some(g) = CONNECTIONS.get() {
        g.with_label_values(&[kind]).dec();
    }
}

#[inline]
pub fn set_present_users(count: usize) {
    if let Some(g) = PRESENT_USERS.get() {
        g.set(count as i64);
    }
}

/// Record one broadcast and how many connections accepted it.
#[inline]
pub fn record_broadcast(scope: &str, delivered: usize) {
    inc(&BROADCASTS, &[scope]);
    if let Some(h) = FANOUT.get() {
        h.observe(delivered as f64);
    }
}

#[inline]
pub fn record_delivery_failure(scope: &str, reason: &str) {
    inc(&DELIVERY_FAILURES, &[scope, reason]);
}

#[inline]
pub fn record_eviction(reason: &str) {
    inc(&EVICTIONS, &[reason]);
}

#[inline]
pub fn record_inbound(outcome: &str) {
    inc(&INBOUND_UNITS, &[outcome]);
}

#[inline]
pub fn record_auth_failure(reason: &str) {
    inc(&AUTH_FAILURES, &[reason]);
}

#[inline]
pub fn record_dispatch_rejected(reason: &str) {
    inc(&DISPATCH_REJECTED, &[reason]);
}

/// Record how long a dispatch waited in the queue plus its fan-out.
#[inline]
pub fn record_dispatch(scope: &str, duration_secs: f64) {
    if let Some(h) = DISPATCH_LATENCY.get() {
        h.with_label_values(&[scope]).observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_broadcast("room", 3);
        record_delivery_failure("room", "closed");
        connection_opened("notify");
        connection_closed("notify");

        let output = gather_metrics();
        assert!(output.contains("roomcast_broadcasts_total"));
        assert!(output.contains("roomcast_delivery_failures_total"));
    }
}
