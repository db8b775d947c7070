//! Request dispatcher.
//!
//! # Responsibilities
//! - Pick a backend per attempt through the selector
//! - Forward under a per-attempt timeout, honoring cancellation
//! - Report each outcome to `HealthState` and the attempt observer
//! - Retry transport failures on the next candidate, up to the budget

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use axum::body::Body;
use axum::http::Response;
use tokio_util::sync::CancellationToken;

use crate::config::DispatchConfig;
use crate::dispatch::attempt::{AttemptObserver, AttemptOutcome, DispatchAttempt, TracingObserver};
use crate::error::BalancerError;
use crate::health::passive::{PassivePolicy, Verdict};
use crate::load_balancer::backend::{BackendId, ForwardRequest};
use crate::load_balancer::pool::BalancerRegistry;
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::{Selector, SharedBackend};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::with_timeout;

pub struct Dispatcher {
    registry: Arc<BalancerRegistry>,
    selector: Arc<dyn Selector>,
    policy: RetryPolicy,
    passive: PassivePolicy,
    attempt_timeout: Duration,
    observer: Arc<dyn AttemptObserver>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<BalancerRegistry>,
        selector: Arc<dyn Selector>,
        policy: RetryPolicy,
        passive: PassivePolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            selector,
            policy,
            passive,
            attempt_timeout,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Round-robin dispatcher configured from `[dispatch]`.
    pub fn from_config(registry: Arc<BalancerRegistry>, config: &DispatchConfig) -> Self {
        Self::new(
            registry,
            Arc::new(RoundRobin::new()),
            RetryPolicy::from_config(config),
            PassivePolicy::from_config(config),
            Duration::from_millis(config.attempt_timeout_ms),
        )
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &Arc<BalancerRegistry> {
        &self.registry
    }

    /// Forward `request` to the first backend that accepts it.
    ///
    /// Cancelling `cancel` aborts the in-flight attempt and any retry.
    pub async fn handle(
        &self,
        request: &ForwardRequest,
        cancel: &CancellationToken,
    ) -> Result<Response<Body>, BalancerError> {
        let budget = self.policy.max_attempts(self.registry.len());
        let mut attempts = 0u32;

        while attempts < budget {
            if cancel.is_cancelled() {
                return Err(BalancerError::Cancelled);
            }

            let backends = self.registry.snapshot();
            let backend = match self.selector.next(&backends) {
                Ok(backend) => backend,
                Err(e) => {
                    tracing::warn!(attempts, backends = backends.len(), "No alive backend to dispatch to");
                    return Err(e);
                }
            };
            attempts += 1;

            let id = backend.id();
            let started_at = SystemTime::now();
            let clock = Instant::now();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.emit(&backend, attempts, AttemptOutcome::Cancelled, started_at, clock);
                    return Err(BalancerError::Cancelled);
                }
                result = with_timeout(self.attempt_timeout, id, backend.forward(request)) => result,
            };

            let error = match result {
                Ok(response) => {
                    let status = response.status();
                    match self.passive.judge(status) {
                        Verdict::Healthy => {
                            self.record(id, true);
                            self.emit(&backend, attempts, AttemptOutcome::Success(status), started_at, clock);
                            return Ok(response);
                        }
                        Verdict::Failed => {
                            self.record(id, false);
                            self.emit(
                                &backend,
                                attempts,
                                AttemptOutcome::UpstreamHttpError(status),
                                started_at,
                                clock,
                            );
                            let error = BalancerError::UpstreamHttpError { backend: id, status };
                            // Without a retry the client gets the upstream's own answer.
                            if !self.policy.is_retryable(&error) || attempts >= budget {
                                return Ok(response);
                            }
                            error
                        }
                    }
                }
                Err(error) => {
                    self.record(id, false);
                    self.emit(
                        &backend,
                        attempts,
                        AttemptOutcome::Unreachable(error.to_string()),
                        started_at,
                        clock,
                    );
                    if !self.policy.is_retryable(&error) {
                        return Err(error);
                    }
                    error
                }
            };

            tracing::debug!(backend = %id, attempt = attempts, budget, error = %error, "Trying next backend");
        }

        tracing::warn!(attempts, "Retry budget exhausted");
        Err(BalancerError::UpstreamUnavailable { attempts })
    }

    fn record(&self, id: BackendId, success: bool) {
        let health = self.registry.health();
        let recorded = if success {
            health.record_success(id)
        } else {
            health.record_failure(id)
        };
        if let Err(e) = recorded {
            // Deregistered while the request was in flight.
            tracing::debug!(backend = %id, error = %e, "Outcome not recorded");
        }
    }

    fn emit(
        &self,
        backend: &SharedBackend,
        attempt: u32,
        outcome: AttemptOutcome,
        started_at: SystemTime,
        clock: Instant,
    ) {
        self.observer.observe(&DispatchAttempt {
            backend: backend.id(),
            address: backend.address().to_string(),
            attempt,
            outcome,
            started_at,
            elapsed: clock.elapsed(),
        });
    }
}
