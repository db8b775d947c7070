//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::BalancerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse a TOML file without semantic checks, so callers can apply
/// overrides before validating.
pub fn parse_config(path: &Path) -> Result<BalancerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BalancerConfig, ConfigError> {
    let config = parse_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [listener]
        bind_address = "127.0.0.1:8000"

        [[backends]]
        address = "127.0.0.1:3001"

        [[backends]]
        address = "http://127.0.0.1:3002"

        [health_check]
        unhealthy_threshold = 5

        [dispatch]
        max_attempts = 2
        failure_statuses = [502, 503]
    "#;

    #[test]
    fn test_parse_with_defaults() {
        let config: BalancerConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.health_check.unhealthy_threshold, 5);
        assert!(!config.health_check.active);
        assert_eq!(
            config.health_check.recovery_window(),
            Some(std::time::Duration::from_secs(10))
        );
        assert_eq!(config.dispatch.max_attempts, Some(2));
        assert_eq!(config.dispatch.attempt_timeout_ms, 5_000);
        assert_eq!(config.listener.max_body_bytes, 1024 * 1024);
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join(format!("http-balancer-{}.toml", std::process::id()));
        fs::write(&path, SAMPLE).unwrap();
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8000");
    }

    #[test]
    fn test_load_rejects_invalid() {
        let path = std::env::temp_dir().join(format!("http-balancer-invalid-{}.toml", std::process::id()));
        fs::write(&path, "[health_check]\nunhealthy_threshold = 0\n").unwrap();
        let err = load_config(&path).unwrap_err();
        fs::remove_file(&path).unwrap();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
