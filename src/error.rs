//! Error taxonomy for selection, dispatch and registry operations.
//!
//! # Propagation
//! ```text
//! BackendUnreachable  → recovered inside the dispatcher (retry next candidate)
//! UpstreamHttpError   → recorded, returned as-is unless status retries enabled
//! NoAvailableBackend  → fatal for the request (503)
//! UpstreamUnavailable → retry budget exhausted (502)
//! NotFound            → admin API only (404)
//! ```

use axum::http::StatusCode;
use thiserror::Error;

use crate::load_balancer::backend::BackendId;

/// Errors surfaced by the balancer core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BalancerError {
    /// Connect failure, I/O failure or attempt timeout. Retried.
    #[error("backend {backend} unreachable: {reason}")]
    BackendUnreachable { backend: BackendId, reason: String },

    /// Backend answered with a status configured as a failure.
    #[error("backend {backend} responded with {status}")]
    UpstreamHttpError { backend: BackendId, status: StatusCode },

    /// Every backend in the set reports not-alive.
    #[error("no available backend")]
    NoAvailableBackend,

    /// All dispatch attempts failed.
    #[error("upstream unavailable after {attempts} attempt(s)")]
    UpstreamUnavailable { attempts: u32 },

    #[error("backend {0} not found")]
    NotFound(BackendId),

    #[error("backend {0} is the last one and cannot be removed")]
    LastBackend(BackendId),

    #[error("backend with address {0} already registered")]
    DuplicateBackend(String),

    #[error("invalid backend address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The caller went away or the process is shutting down.
    #[error("request cancelled")]
    Cancelled,
}

impl BalancerError {
    /// True for transport-level failures that another backend may not share.
    pub fn is_transport(&self) -> bool {
        matches!(self, BalancerError::BackendUnreachable { .. })
    }

    /// Status code the HTTP boundary answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BalancerError::BackendUnreachable { .. }
            | BalancerError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            BalancerError::UpstreamHttpError { status, .. } => *status,
            BalancerError::NoAvailableBackend | BalancerError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            BalancerError::NotFound(_) => StatusCode::NOT_FOUND,
            BalancerError::LastBackend(_) | BalancerError::DuplicateBackend(_) => {
                StatusCode::CONFLICT
            }
            BalancerError::InvalidAddress { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unreachable_is_transport() {
        let unreachable = BalancerError::BackendUnreachable {
            backend: BackendId::new(1),
            reason: "connection refused".into(),
        };
        assert!(unreachable.is_transport());
        assert!(!BalancerError::NoAvailableBackend.is_transport());
        assert!(!BalancerError::UpstreamHttpError {
            backend: BackendId::new(1),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
        .is_transport());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(BalancerError::NoAvailableBackend.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            BalancerError::UpstreamUnavailable { attempts: 3 }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(BalancerError::NotFound(BackendId::new(7)).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(BalancerError::LastBackend(BackendId::new(7)).status_code(), StatusCode::CONFLICT);
    }
}
