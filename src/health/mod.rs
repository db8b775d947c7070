//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Passive (passive.rs, mandatory):
//!     Dispatcher finishes an attempt
//!     → classify outcome (transport error / failure status / success)
//!     → state.rs record_failure / record_success
//!
//! Active (active.rs, optional):
//!     Periodic timer
//!     → probe each backend
//!     → state.rs record_failure / record_success
//!
//! External collaborators:
//!     → state.rs set_alive (liveness push)
//! ```
//!
//! # Design Decisions
//! - One consecutive-failure counter per backend, shared by all sources
//! - A single success revives a dead backend
//! - Health state is per-backend, not per-pool

pub mod active;
pub mod passive;
pub mod state;

pub use state::{HealthRecord, HealthState};
