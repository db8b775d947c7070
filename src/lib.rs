//! Round-robin HTTP load balancer library.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;

pub use config::schema::BalancerConfig;
pub use dispatch::Dispatcher;
pub use error::BalancerError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
