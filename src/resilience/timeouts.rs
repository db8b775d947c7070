//! Timeout enforcement.
//!
//! An attempt that outlives its deadline is dropped, which cancels the
//! underlying connection, and reported as `BackendUnreachable`.

use std::future::Future;
use std::time::Duration;

use crate::error::BalancerError;
use crate::load_balancer::backend::BackendId;

/// Bound `attempt` by `limit`.
pub async fn with_timeout<F, T>(limit: Duration, backend: BackendId, attempt: F) -> Result<T, BalancerError>
where
    F: Future<Output = Result<T, BalancerError>>,
{
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(BalancerError::BackendUnreachable {
            backend,
            reason: format!("timed out after {}ms", limit.as_millis()),
        }),
    }
}
