//! Backend registry.
//!
//! # Responsibilities
//! - Own the ordered set of backends (order = round-robin traversal order)
//! - Add and remove backends at runtime
//! - Hand out consistent, immutable snapshots to selectors
//!
//! # Design Decisions
//! - Copy-on-write: writers build a new `BackendSet` and swap it in, so a
//!   snapshot is never partially updated and readers take no lock
//! - Writers are serialized by a mutex, which readers never touch
//! - The last backend cannot be removed

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use url::Url;

use crate::error::BalancerError;
use crate::health::state::{HealthRecord, HealthState};
use crate::load_balancer::backend::{parse_address, BackendId, HttpBackend, HttpClient};
use crate::load_balancer::SharedBackend;

/// Immutable, ordered view of the registered backends.
#[derive(Debug, Default)]
pub struct BackendSet {
    backends: Vec<SharedBackend>,
}

impl BackendSet {
    pub fn new(backends: Vec<SharedBackend>) -> Self {
        Self { backends }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SharedBackend> {
        self.backends.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedBackend> {
        self.backends.iter()
    }

    pub fn find(&self, id: BackendId) -> Option<&SharedBackend> {
        self.backends.iter().find(|b| b.id() == id)
    }
}

/// Outcome of reconciling the registry against a desired address list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<BackendId>,
    pub removed: Vec<BackendId>,
}

/// Owns the mutable backend set.
#[derive(Debug)]
pub struct BalancerRegistry {
    current: ArcSwap<BackendSet>,
    writer: Mutex<()>,
    next_id: AtomicU64,
    health: Arc<HealthState>,
    client: HttpClient,
}

impl BalancerRegistry {
    pub fn new(health: Arc<HealthState>, client: HttpClient) -> Self {
        Self {
            current: ArcSwap::from_pointee(BackendSet::default()),
            writer: Mutex::new(()),
            next_id: AtomicU64::new(1),
            health,
            client,
        }
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    /// Consistent copy of the current set for one selection.
    pub fn snapshot(&self) -> Arc<BackendSet> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Register a reverse-proxy backend for `address`.
    pub fn add_backend(&self, address: &str) -> Result<BackendId, BalancerError> {
        let url = parse_address(address)?;
        let client = self.client.clone();
        self.add_with(url, |id, url, health| {
            Ok(Arc::new(HttpBackend::new(id, url, health, client)?) as SharedBackend)
        })
    }

    /// Register a backend built by `build`. The closure receives the new id,
    /// the address and the health record the backend must read liveness from.
    pub fn add_with<F>(&self, address: Url, build: F) -> Result<BackendId, BalancerError>
    where
        F: FnOnce(BackendId, Url, Arc<HealthRecord>) -> Result<SharedBackend, BalancerError>,
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.current.load_full();
        if current.iter().any(|b| b.address() == &address) {
            return Err(BalancerError::DuplicateBackend(address.to_string()));
        }

        let id = BackendId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let health = self.health.register(id);
        let backend = match build(id, address.clone(), health) {
            Ok(backend) => backend,
            Err(e) => {
                self.health.deregister(id);
                return Err(e);
            }
        };

        let mut backends = current.backends.clone();
        backends.push(backend);
        self.current.store(Arc::new(BackendSet::new(backends)));

        tracing::info!(backend = %id, address = %address, "Backend registered");
        Ok(id)
    }

    /// Deregister a backend. In-flight requests keep their own reference.
    /// Removing the last backend is rejected.
    pub fn remove_backend(&self, id: BackendId) -> Result<SharedBackend, BalancerError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.current.load_full();
        let position = current
            .iter()
            .position(|b| b.id() == id)
            .ok_or(BalancerError::NotFound(id))?;
        if current.len() == 1 {
            return Err(BalancerError::LastBackend(id));
        }

        let mut backends = current.backends.clone();
        let removed = backends.remove(position);
        self.current.store(Arc::new(BackendSet::new(backends)));
        self.health.deregister(id);

        tracing::info!(backend = %id, address = %removed.address(), "Backend deregistered");
        Ok(removed)
    }

    /// Make the registered addresses match `addresses`: new ones are added,
    /// missing ones removed. The last remaining backend is kept.
    pub fn reconcile(&self, addresses: &[String]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut desired = Vec::with_capacity(addresses.len());

        for address in addresses {
            match parse_address(address) {
                Ok(url) => desired.push(url),
                Err(e) => tracing::warn!(error = %e, "Skipping backend during reconcile"),
            }
        }

        for url in &desired {
            if self.snapshot().iter().any(|b| b.address() == url) {
                continue;
            }
            match self.add_backend(url.as_str()) {
                Ok(id) => report.added.push(id),
                Err(e) => tracing::warn!(error = %e, "Failed to add backend during reconcile"),
            }
        }

        let stale: Vec<BackendId> = self
            .snapshot()
            .iter()
            .filter(|b| !desired.contains(b.address()))
            .map(|b| b.id())
            .collect();

        for id in stale {
            match self.remove_backend(id) {
                Ok(_) => report.removed.push(id),
                Err(e) => tracing::warn!(error = %e, "Failed to remove backend during reconcile"),
            }
        }

        report
    }
}
