//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_requests_total` (counter): inbound requests by status
//! - `lb_request_duration_seconds` (histogram): end-to-end latency
//! - `lb_dispatch_attempts_total` (counter): attempts by backend, outcome
//! - `lb_attempt_duration_seconds` (histogram): per-attempt latency
//! - `lb_backend_alive` (gauge): 1=alive, 0=dead
//! - `lb_backend_transitions_total` (counter): liveness flips by direction

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::backend::BackendId;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, start: Instant) {
    metrics::counter!("lb_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("lb_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(backend: BackendId, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(
        "lb_dispatch_attempts_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("lb_attempt_duration_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_backend_health(backend: BackendId, alive: bool) {
    metrics::gauge!("lb_backend_alive", "backend" => backend.to_string()).set(if alive { 1.0 } else { 0.0 });
}

pub fn record_transition(backend: BackendId, alive: bool) {
    let to = if alive { "alive" } else { "dead" };
    metrics::counter!("lb_backend_transitions_total", "backend" => backend.to_string(), "to" => to).increment(1);
    record_backend_health(backend, alive);
}
