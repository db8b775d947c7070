//! Scriptable in-process backend.
//!
//! Behaves like an upstream without any network: each `forward` call pops
//! the next scripted behavior, falling back to a fixed one when the script
//! runs out. Used by the test suites and handy for dry runs of a config.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Response, StatusCode};
use url::Url;

use crate::error::BalancerError;
use crate::health::state::HealthRecord;
use crate::load_balancer::backend::{Backend, BackendId, ForwardRequest};
use crate::load_balancer::pool::BalancerRegistry;
use crate::load_balancer::SharedBackend;

/// What a mock backend does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Answer with this status and the backend's name as body.
    Respond(StatusCode),
    /// Fail like a refused connection.
    Refuse,
    /// Never answer.
    Hang,
}

#[derive(Debug)]
pub struct MockBackend {
    id: BackendId,
    name: String,
    address: Url,
    health: Arc<HealthRecord>,
    script: Mutex<VecDeque<MockBehavior>>,
    fallback: MockBehavior,
    calls: AtomicUsize,
}

impl MockBackend {
    /// Register a mock named `name` in the registry.
    pub fn register(
        registry: &BalancerRegistry,
        name: &str,
        fallback: MockBehavior,
    ) -> Result<Arc<MockBackend>, BalancerError> {
        Self::register_scripted(registry, name, Vec::new(), fallback)
    }

    /// Register a mock that plays `script` before settling on `fallback`.
    pub fn register_scripted(
        registry: &BalancerRegistry,
        name: &str,
        script: Vec<MockBehavior>,
        fallback: MockBehavior,
    ) -> Result<Arc<MockBackend>, BalancerError> {
        let address = Url::parse(&format!("http://{}.mock/", name)).map_err(|e| {
            BalancerError::InvalidAddress {
                address: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut created = None;
        registry.add_with(address, |id, address, health| {
            let mock = Arc::new(MockBackend {
                id,
                name: name.to_string(),
                address,
                health,
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicUsize::new(0),
            });
            created = Some(mock.clone());
            Ok(mock as SharedBackend)
        })?;

        created.ok_or_else(|| BalancerError::InvalidAddress {
            address: name.to_string(),
            reason: "mock was not constructed".to_string(),
        })
    }

    /// Number of `forward` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> MockBehavior {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn address(&self) -> &Url {
        &self.address
    }

    fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    fn admit_trial(&self) -> bool {
        self.health.admit_trial()
    }

    async fn forward(&self, _request: &ForwardRequest) -> Result<Response<Body>, BalancerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.next_behavior() {
            MockBehavior::Respond(status) => {
                let mut response = Response::new(Body::from(self.name.clone()));
                *response.status_mut() = status;
                Ok(response)
            }
            MockBehavior::Refuse => Err(BalancerError::BackendUnreachable {
                backend: self.id,
                reason: "connection refused".to_string(),
            }),
            MockBehavior::Hang => std::future::pending().await,
        }
    }
}
