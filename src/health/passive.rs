//! Passive health checking (failure detection from live traffic).
//!
//! # Design Decisions
//! - Transport errors and attempt timeouts always count as failures
//! - Upstream statuses count only when listed in `failure_statuses`
//! - 4xx/5xx are otherwise the backend's answer, passed through untouched

use axum::http::StatusCode;

use crate::config::DispatchConfig;

/// How a forward attempt reflects on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct PassivePolicy {
    failure_statuses: Vec<StatusCode>,
}

impl PassivePolicy {
    pub fn new(failure_statuses: Vec<StatusCode>) -> Self {
        Self { failure_statuses }
    }

    /// Invalid codes are dropped; validation rejects them before this point.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(
            config
                .failure_statuses
                .iter()
                .filter_map(|code| StatusCode::from_u16(*code).ok())
                .collect(),
        )
    }

    /// Verdict for a backend that answered with `status`.
    pub fn judge(&self, status: StatusCode) -> Verdict {
        if self.failure_statuses.contains(&status) {
            Verdict::Failed
        } else {
            Verdict::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_counts_no_status_as_failure() {
        let policy = PassivePolicy::default();
        assert_eq!(policy.judge(StatusCode::OK), Verdict::Healthy);
        assert_eq!(policy.judge(StatusCode::INTERNAL_SERVER_ERROR), Verdict::Healthy);
        assert_eq!(policy.judge(StatusCode::NOT_FOUND), Verdict::Healthy);
    }

    #[test]
    fn test_configured_statuses() {
        let config = DispatchConfig {
            failure_statuses: vec![502, 503, 1000],
            ..DispatchConfig::default()
        };
        let policy = PassivePolicy::from_config(&config);
        assert_eq!(policy.judge(StatusCode::BAD_GATEWAY), Verdict::Failed);
        assert_eq!(policy.judge(StatusCode::SERVICE_UNAVAILABLE), Verdict::Failed);
        assert_eq!(policy.judge(StatusCode::INTERNAL_SERVER_ERROR), Verdict::Healthy);
    }
}
