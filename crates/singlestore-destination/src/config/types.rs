//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database connection.
    pub target: TargetConfig,

    /// Batch apply behavior.
    #[serde(default)]
    pub apply: ApplyConfig,
}

/// SingleStore connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Default database for the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Extra session settings, `key=value` pairs separated by `;`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_parameters: Option<String>,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("driver_parameters", &self.driver_parameters)
            .finish()
    }
}

/// Batch apply configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Rows per commit when a request does not set its own (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_port() -> u16 {
    3306
}

fn default_require() -> String {
    "require".to_string()
}

fn default_batch_size() -> usize {
    10_000
}
