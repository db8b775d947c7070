//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate backend addresses and value ranges
//! - Returns all validation errors, not just the first

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BalancerConfig, PLACEHOLDER_API_KEY};
use crate::load_balancer::backend::parse_address;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one backend is required")]
    NoBackends,

    #[error("backend {address:?}: {reason}")]
    InvalidBackend { address: String, reason: String },

    #[error("backend {0:?} listed more than once")]
    DuplicateBackend(String),

    #[error("{field}: {reason}")]
    OutOfRange { field: &'static str, reason: &'static str },

    #[error("{field}: {value:?} is not a socket address")]
    InvalidBindAddress { field: &'static str, value: String },

    #[error("dispatch.failure_statuses: {0} is not an HTTP status code")]
    InvalidStatus(u16),
}

/// Check a parsed configuration. Pure function.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut seen = HashSet::new();
    for backend in &config.backends {
        match parse_address(&backend.address) {
            Ok(url) => {
                if !seen.insert(url) {
                    errors.push(ValidationError::DuplicateBackend(backend.address.clone()));
                }
            }
            Err(e) => errors.push(ValidationError::InvalidBackend {
                address: backend.address.clone(),
                reason: e.to_string(),
            }),
        }
    }

    check_bind(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_bind(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::OutOfRange {
                field: "admin.api_key",
                reason: "must not be empty",
            });
        } else if config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::OutOfRange {
                field: "admin.api_key",
                reason: "still set to the shipped placeholder",
            });
        }
    }
    if config.observability.metrics_enabled {
        check_bind(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    let ranges = [
        ("listener.max_body_bytes", config.listener.max_body_bytes == 0),
        ("health_check.unhealthy_threshold", config.health_check.unhealthy_threshold == 0),
        ("dispatch.max_attempts", config.dispatch.max_attempts == Some(0)),
        ("dispatch.attempt_timeout_ms", config.dispatch.attempt_timeout_ms == 0),
        ("dispatch.connect_timeout_ms", config.dispatch.connect_timeout_ms == 0),
    ];
    for (field, invalid) in ranges {
        if invalid {
            errors.push(ValidationError::OutOfRange {
                field,
                reason: "must be greater than zero",
            });
        }
    }

    if config.health_check.active {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::OutOfRange {
                field: "health_check.interval_secs",
                reason: "must be greater than zero",
            });
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::OutOfRange {
                field: "health_check.timeout_secs",
                reason: "must be greater than zero",
            });
        }
        if !config.health_check.path.starts_with('/') {
            errors.push(ValidationError::OutOfRange {
                field: "health_check.path",
                reason: "must start with '/'",
            });
        }
    }

    for status in &config.dispatch.failure_statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::InvalidStatus(*status));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_bind(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    fn valid() -> BalancerConfig {
        BalancerConfig {
            backends: vec![BackendConfig::new("127.0.0.1:3001"), BackendConfig::new("127.0.0.1:3002")],
            ..BalancerConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = valid();
        config.backends.push(BackendConfig::new("http://127.0.0.1:3001/"));
        config.backends.push(BackendConfig::new("ftp://files:21"));
        config.health_check.unhealthy_threshold = 0;
        config.dispatch.max_attempts = Some(0);
        config.dispatch.failure_statuses = vec![503, 700];
        config.listener.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6, "{:?}", errors);
        assert!(errors.contains(&ValidationError::DuplicateBackend("http://127.0.0.1:3001/".into())));
        assert!(errors.contains(&ValidationError::InvalidStatus(700)));
    }

    #[test]
    fn test_admin_requires_real_key() {
        let mut config = valid();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::OutOfRange {
                field: "admin.api_key",
                reason: "still set to the shipped placeholder",
            }]
        );

        config.admin.api_key = "s3cret-admin-key".into();
        assert_eq!(validate_config(&config), Ok(()));

        // Disabled admin never looks at the key.
        config.admin.enabled = false;
        config.admin.api_key = PLACEHOLDER_API_KEY.into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_no_backends() {
        let errors = validate_config(&BalancerConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoBackends]);
    }
}
