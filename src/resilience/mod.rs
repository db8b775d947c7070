//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forward attempt:
//!     → timeouts.rs (bound the attempt; elapsed = transport failure)
//!     → On failure: retries.rs (retryable? budget left?)
//!     → next candidate from the selector
//! ```
//!
//! # Design Decisions
//! - Every attempt has a deadline
//! - Transport failures retry on the next backend without delay
//! - Upstream error statuses are not retried unless configured
//! - The attempt budget defaults to the number of backends

pub mod retries;
pub mod timeouts;
