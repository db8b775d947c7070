//! HTTP boundary subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (request ID, X-Forwarded-* headers)
//!     → dispatcher picks a backend and forwards
//!     → response.rs (strip hop-by-hop headers, map errors to 5xx)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
