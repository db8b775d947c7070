//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher needs a candidate
//!     → pool.rs (immutable snapshot of the current BackendSet)
//!     → round_robin.rs (atomic cursor, skip backends reporting not-alive)
//!     → backend.rs (forward the request to the chosen upstream)
//! ```
//!
//! # Design Decisions
//! - Selectors hold only their cursor; backends and health live elsewhere
//! - A selection never blocks: snapshot load plus atomic reads
//! - Backends are trait objects so test doubles plug into the same path
//! - In-flight requests hold an `Arc` to their backend; removal never frees it

pub mod backend;
pub mod mock;
pub mod pool;
pub mod round_robin;

use std::sync::Arc;

use crate::error::BalancerError;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::pool::BackendSet;

/// A backend shared between the registry and in-flight requests.
pub type SharedBackend = Arc<dyn Backend>;

/// Strategy picking the next backend from a snapshot.
pub trait Selector: Send + Sync + std::fmt::Debug {
    /// Return the next alive backend, or `NoAvailableBackend` when none is.
    fn next(&self, backends: &BackendSet) -> Result<SharedBackend, BalancerError>;
}
