//! Metrics collection and exposition.
//!
//! # Metrics
//! - `coordinator_starts_total` (counter): start attempts by outcome
//! - `coordinator_shutdowns_total` (counter): shutdown requests by kind, outcome
//! - `coordinator_lock_timeouts_total` (counter): abandoned write acquisitions
//! - `coordinator_dispose_errors_total` (counter): failed disposes
//! - `coordinator_state` (gauge): numeric `ServerState`
//! - `coordinator_requests_total` (counter): admitted requests by status
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and owns its own listener

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::lifecycle::ServerState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_start(outcome: &'static str) {
    metrics::counter!("coordinator_starts_total", "outcome" => outcome).increment(1);
}

pub fn record_shutdown(kind: &'static str, outcome: &'static str) {
    metrics::counter!("coordinator_shutdowns_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_lock_timeout() {
    metrics::counter!("coordinator_lock_timeouts_total").increment(1);
}

pub fn record_dispose_error() {
    metrics::counter!("coordinator_dispose_errors_total").increment(1);
}

pub fn record_state(state: ServerState) {
    metrics::gauge!("coordinator_state").set(state as u8 as f64);
}

pub fn record_request(status: u16) {
    metrics::counter!("coordinator_requests_total", "status" => status.to_string()).increment(1);
}
