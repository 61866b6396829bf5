//! Configuration validation

use super::error::ConfigResult;

/// Trait for validatable configuration objects
pub trait Validatable {
    /// Returns `Ok(())` if valid, `Err(ConfigError)` with details if invalid.
    fn validate(&self) -> ConfigResult<()>;

    /// Get the configuration name for error messages
    fn config_name(&self) -> &'static str {
        "Config"
    }
}

/// Validate a configuration, logging which one was rejected
pub fn check<C: Validatable>(config: &C) -> ConfigResult<()> {
    config
        .validate()
        .inspect_err(|e| tracing::warn!("{} rejected: {}", config.config_name(), e))
}
