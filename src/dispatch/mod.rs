//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (buffered)
//!     → dispatcher.rs: budget = max_attempts or backend count
//!     → loop:
//!         snapshot registry → selector picks next alive backend
//!         → forward under per-attempt timeout (cancellable)
//!         → passive verdict → HealthState success/failure
//!         → attempt.rs: DispatchAttempt handed to the observer
//!         → success: return response | transport failure: next candidate
//!     → budget exhausted: UpstreamUnavailable
//! ```
//!
//! # Design Decisions
//! - The dispatcher never touches backend fields; liveness changes go
//!   through `HealthState` only
//! - Cancellation wins over an in-flight forward and stops all retries
//! - Attempts are events, not state: nothing is kept once a request ends

pub mod attempt;
pub mod dispatcher;

pub use attempt::{AttemptObserver, AttemptOutcome, DispatchAttempt, TracingObserver};
pub use dispatcher::Dispatcher;
