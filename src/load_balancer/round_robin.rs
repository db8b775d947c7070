//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::BalancerError;
use crate::load_balancer::pool::BackendSet;
use crate::load_balancer::{Selector, SharedBackend};

/// Round-robin selector.
///
/// Dead backends are skipped unless their recovery window grants them a
/// trial. The cursor is bumped once per selection. It may wrap around on
/// overflow; that only shifts the starting point of the rotation.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the rotation at an arbitrary cursor value.
    pub fn starting_at(cursor: usize) -> Self {
        Self {
            cursor: AtomicUsize::new(cursor),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }
}

impl Selector for RoundRobin {
    fn next(&self, backends: &BackendSet) -> Result<SharedBackend, BalancerError> {
        let len = backends.len();
        if len == 0 {
            return Err(BalancerError::NoAvailableBackend);
        }

        // fetch_add wraps on overflow
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;

        // At most one full lap, so an all-dead set fails instead of spinning.
        for step in 0..len {
            let index = (start + step) % len;
            if let Some(backend) = backends.get(index) {
                if backend.is_alive() {
                    return Ok(backend.clone());
                }
                if backend.admit_trial() {
                    tracing::debug!(backend = %backend.id(), "Offering dead backend a recovery trial");
                    return Ok(backend.clone());
                }
            }
        }
        Err(BalancerError::NoAvailableBackend)
    }
}
