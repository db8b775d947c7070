//! Per-attempt bookkeeping.

use std::time::{Duration, SystemTime};

use axum::http::StatusCode;

use crate::load_balancer::backend::BackendId;
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Backend answered and the answer counts as healthy.
    Success(StatusCode),
    /// Backend answered with a status configured as a failure.
    UpstreamHttpError(StatusCode),
    /// Connect error, I/O error or timeout.
    Unreachable(String),
    /// The caller cancelled while the attempt was in flight.
    Cancelled,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::UpstreamHttpError(_) => "upstream_http_error",
            AttemptOutcome::Unreachable(_) => "unreachable",
            AttemptOutcome::Cancelled => "cancelled",
        }
    }
}

/// One try of one request against one backend.
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub backend: BackendId,
    pub address: String,
    /// 1-based attempt number within the request.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub started_at: SystemTime,
    pub elapsed: Duration,
}

/// Receives every attempt as it completes.
pub trait AttemptObserver: Send + Sync {
    fn observe(&self, attempt: &DispatchAttempt);
}

/// Default observer: structured log line plus metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn observe(&self, attempt: &DispatchAttempt) {
        match &attempt.outcome {
            AttemptOutcome::Success(status) => tracing::debug!(
                backend = %attempt.backend,
                address = %attempt.address,
                attempt = attempt.attempt,
                status = %status,
                elapsed_ms = attempt.elapsed.as_millis() as u64,
                "Attempt succeeded"
            ),
            AttemptOutcome::UpstreamHttpError(status) => tracing::warn!(
                backend = %attempt.backend,
                address = %attempt.address,
                attempt = attempt.attempt,
                status = %status,
                "Upstream answered with failure status"
            ),
            AttemptOutcome::Unreachable(reason) => tracing::warn!(
                backend = %attempt.backend,
                address = %attempt.address,
                attempt = attempt.attempt,
                error = %reason,
                "Upstream unreachable"
            ),
            AttemptOutcome::Cancelled => tracing::info!(
                backend = %attempt.backend,
                attempt = attempt.attempt,
                "Attempt cancelled"
            ),
        }

        metrics::record_attempt(attempt.backend, attempt.outcome.label(), attempt.elapsed);
    }
}
