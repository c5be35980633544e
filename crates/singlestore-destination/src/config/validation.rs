//! Configuration validation.

use super::{parse_driver_parameters, Config};
use crate::error::{ApplyError, Result};

const SSL_MODES: &[&str] = &[
    "disable",
    "prefer",
    "require",
    "verify-ca",
    "verify_ca",
    "verify-full",
    "verify_identity",
];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.target.host.is_empty() {
        return Err(ApplyError::Config("target.host is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(ApplyError::Config("target.user is required".into()));
    }
    if config.target.port == 0 {
        return Err(ApplyError::Config("target.port must be non-zero".into()));
    }
    if !SSL_MODES.contains(&config.target.ssl_mode.to_lowercase().as_str()) {
        return Err(ApplyError::Config(format!(
            "target.ssl_mode must be one of {}, got '{}'",
            SSL_MODES.join(", "),
            config.target.ssl_mode
        )));
    }
    if let Some(params) = &config.target.driver_parameters {
        parse_driver_parameters(params)?;
    }

    if config.apply.batch_size == 0 {
        return Err(ApplyError::Config(
            "apply.batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}
