//! Retry policy.
//!
//! # Design Decisions
//! - Connection errors and timeouts always retryable
//! - Failure statuses retried only when `retry_on_failure_status` is set,
//!   since the request may not be idempotent
//! - No more attempts than configured, and never fewer than one

use crate::config::DispatchConfig;
use crate::error::BalancerError;

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    retry_on_failure_status: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: Option<u32>, retry_on_failure_status: bool) -> Self {
        Self {
            max_attempts,
            retry_on_failure_status,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.max_attempts, config.retry_on_failure_status)
    }

    /// Attempt budget for a request when `backend_count` backends are registered.
    pub fn max_attempts(&self, backend_count: usize) -> u32 {
        self.max_attempts
            .unwrap_or_else(|| u32::try_from(backend_count).unwrap_or(u32::MAX))
            .max(1)
    }

    pub fn is_retryable(&self, error: &BalancerError) -> bool {
        match error {
            BalancerError::BackendUnreachable { .. } => true,
            BalancerError::UpstreamHttpError { .. } => self.retry_on_failure_status,
            _ => false,
        }
    }
}
