//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gate metrics (decisions, blocks, throttles, state sizes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by outcome
//! - `gate_ip_blocks_total` (counter): blocklist insertions by reason
//! - `gate_rate_limited_total` (counter): 429 responses
//! - `gate_blocked_identities` (gauge): live blocklist entries
//! - `gate_tracked_windows` (gauge): sliding windows by owner
//! - `gate_decision_duration_seconds` (histogram): time spent in the gate
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are static strings to keep cardinality bounded

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(outcome: &'static str, started: Instant) {
    counter!("gate_requests_total", "outcome" => outcome).increment(1);
    histogram!("gate_decision_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_ip_blocked(reason: &'static str) {
    counter!("gate_ip_blocks_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited() {
    counter!("gate_rate_limited_total").increment(1);
}

pub fn record_blocklist_size(size: usize) {
    gauge!("gate_blocked_identities").set(size as f64);
}

pub fn record_window_count(owner: &'static str, count: usize) {
    gauge!("gate_tracked_windows", "owner" => owner).set(count as f64);
}
