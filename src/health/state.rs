//! Backend health state.
//!
//! # States
//! - Alive: backend receives traffic
//! - Dead: backend skipped by the selector
//!
//! # State Transitions
//! ```text
//! Alive → Dead:  consecutive failures >= unhealthy_threshold
//! Dead  → Alive: one success (forward or out-of-band health check)
//! Dead  → trial: recovery window elapsed; one request may try it
//! ```
//!
//! A dead backend gets one trial request per recovery window. The trial's
//! outcome is recorded like any other forward.
//!
//! Reads are lock-free atomic loads. The per-backend map is a `DashMap`,
//! so registering or dropping a backend never blocks readers of others.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::BalancerError;
use crate::load_balancer::backend::BackendId;
use crate::observability::metrics;

/// Liveness record of one backend. Only `HealthState` mutates it.
#[derive(Debug)]
pub struct HealthRecord {
    alive: AtomicBool,
    consecutive_failures: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    created: Instant,
    /// Milliseconds after `created` of the last death or trial grant.
    last_dead_mark: AtomicU64,
    recovery_window: Option<Duration>,
}

impl HealthRecord {
    fn new(recovery_window: Option<Duration>) -> Self {
        Self {
            alive: AtomicBool::new(true),
            consecutive_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            created: Instant::now(),
            last_dead_mark: AtomicU64::new(0),
            recovery_window,
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Claim the trial slot of a dead backend whose recovery window has
    /// elapsed. At most one caller per window gets `true`.
    pub fn admit_trial(&self) -> bool {
        let Some(window) = self.recovery_window else {
            return false;
        };
        if self.is_alive() {
            return false;
        }

        let now = self.now_ms();
        let last = self.last_dead_mark.load(Ordering::Acquire);
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        if now.saturating_sub(last) < window_ms {
            return false;
        }
        self.last_dead_mark
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true if this success revived the backend.
    fn on_success(&self) -> bool {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        !self.alive.swap(true, Ordering::AcqRel)
    }

    /// Returns true if this failure killed the backend.
    fn on_failure(&self, threshold: u64) -> bool {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures < threshold {
            return false;
        }
        let killed = self.alive.swap(false, Ordering::AcqRel);
        if killed {
            self.last_dead_mark.store(self.now_ms(), Ordering::Release);
        }
        killed
    }

    /// Returns true if the flag changed.
    fn force(&self, alive: bool) -> bool {
        if alive {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        }
        let changed = self.alive.swap(alive, Ordering::AcqRel) != alive;
        if changed && !alive {
            self.last_dead_mark.store(self.now_ms(), Ordering::Release);
        }
        changed
    }
}

/// Liveness of every registered backend.
#[derive(Debug)]
pub struct HealthState {
    records: DashMap<BackendId, Arc<HealthRecord>>,
    unhealthy_threshold: u64,
    recovery_window: Option<Duration>,
}

/// Recovery window used unless configured otherwise.
pub const DEFAULT_RECOVERY_WINDOW: Duration = Duration::from_secs(10);

impl HealthState {
    /// A threshold of zero is treated as one.
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            records: DashMap::new(),
            unhealthy_threshold: u64::from(unhealthy_threshold.max(1)),
            recovery_window: Some(DEFAULT_RECOVERY_WINDOW),
        }
    }

    /// `None` disables trials; dead backends then only return through a
    /// health check or a push. Applies to backends registered afterwards.
    pub fn with_recovery_window(mut self, window: Option<Duration>) -> Self {
        self.recovery_window = window;
        self
    }

    pub fn unhealthy_threshold(&self) -> u64 {
        self.unhealthy_threshold
    }

    /// Start tracking a backend. New backends are alive.
    pub fn register(&self, id: BackendId) -> Arc<HealthRecord> {
        let record = self
            .records
            .entry(id)
            .or_insert_with(|| Arc::new(HealthRecord::new(self.recovery_window)))
            .clone();
        metrics::record_backend_health(id, true);
        record
    }

    /// Stop tracking a backend. Requests still holding it keep their record.
    pub fn deregister(&self, id: BackendId) {
        self.records.remove(&id);
    }

    pub fn record(&self, id: BackendId) -> Option<Arc<HealthRecord>> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// Unknown backends are reported dead.
    pub fn is_alive(&self, id: BackendId) -> bool {
        self.record(id).is_some_and(|r| r.is_alive())
    }

    pub fn record_success(&self, id: BackendId) -> Result<(), BalancerError> {
        let record = self.record(id).ok_or(BalancerError::NotFound(id))?;
        if record.on_success() {
            tracing::info!(backend = %id, "Backend recovered, marked alive");
            metrics::record_transition(id, true);
        }
        Ok(())
    }

    pub fn record_failure(&self, id: BackendId) -> Result<(), BalancerError> {
        let record = self.record(id).ok_or(BalancerError::NotFound(id))?;
        if record.on_failure(self.unhealthy_threshold) {
            tracing::warn!(
                backend = %id,
                consecutive_failures = record.consecutive_failures(),
                "Backend marked dead"
            );
            metrics::record_transition(id, false);
        }
        Ok(())
    }

    /// Liveness push from an external collaborator.
    pub fn set_alive(&self, id: BackendId, alive: bool) -> Result<(), BalancerError> {
        let record = self.record(id).ok_or(BalancerError::NotFound(id))?;
        if record.force(alive) {
            tracing::info!(backend = %id, alive, "Backend liveness set externally");
            metrics::record_transition(id, alive);
        }
        Ok(())
    }
}
