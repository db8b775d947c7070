//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → backend list reconciled into the registry
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only the backend list is hot-reloadable; the rest needs a restart
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BackendConfig, BalancerConfig, DispatchConfig, HealthCheckConfig, ListenerConfig,
    ObservabilityConfig,
};
pub use validation::{validate_config, ValidationError};
