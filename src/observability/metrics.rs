//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (routing decisions, connection counts)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_packets_forwarded_total` (counter): relayed frames by kind
//! - `proxy_packets_dropped_total` (counter): discarded frames by reason
//! - `proxy_packets_intercepted_total` (counter): frames run through policy
//! - `proxy_active_connections` (gauge): current client connection count
//!
//! # Design Decisions
//! - Recording functions are safe no-ops until the recorder is installed
//! - Labels name the routing decision, never packet contents

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(err) => tracing::error!(error = %err, "Failed to start metrics endpoint"),
    }
}

pub fn record_forwarded(kind: &'static str) {
    metrics::counter!("proxy_packets_forwarded_total", "kind" => kind).increment(1);
}

pub fn record_dropped(reason: &'static str) {
    metrics::counter!("proxy_packets_dropped_total", "reason" => reason).increment(1);
}

pub fn record_intercepted(kind: &'static str) {
    metrics::counter!("proxy_packets_intercepted_total", "kind" => kind).increment(1);
}

pub fn record_connection_opened() {
    metrics::gauge!("proxy_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("proxy_active_connections").decrement(1.0);
}
