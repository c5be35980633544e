//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{ApplyError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl TargetConfig {
    /// Session settings from `driver_parameters`.
    pub fn session_settings(&self) -> Result<Vec<(String, String)>> {
        match &self.driver_parameters {
            Some(params) => parse_driver_parameters(params),
            None => Ok(Vec::new()),
        }
    }
}

/// Parse `key=value;key2=value2` into pairs.
///
/// Empty segments are skipped. A segment without `=` or with an empty key is
/// malformed.
pub fn parse_driver_parameters(params: &str) -> Result<Vec<(String, String)>> {
    params
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                ApplyError::MalformedInput(format!(
                    "Driver parameter '{}' is not of the form key=value",
                    segment
                ))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ApplyError::MalformedInput(format!(
                    "Driver parameter '{}' has an empty key",
                    segment
                )));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
