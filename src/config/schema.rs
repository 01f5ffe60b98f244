//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the host.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the restart host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Restart coordination settings.
    pub restart: RestartConfig,

    /// Entries published through the environment lookup.
    pub environment: EnvironmentConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Restart coordination configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Upper bound on waiting for in-flight requests before a restart is abandoned.
    pub write_lock_timeout_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            write_lock_timeout_secs: 60,
        }
    }
}

/// Environment entries and resources.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Path of the file-backed datasource.
    pub file_datasource: Option<String>,

    /// Explicit datasource selection ("file" or "database").
    pub datasource: Option<String>,

    /// Database resource.
    pub database: Option<DatabaseConfig>,

    /// Mail session resource.
    pub mail: Option<MailConfig>,

    /// Additional free-form string entries.
    pub entries: BTreeMap<String, String>,
}

/// Database resource configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Mail session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    pub smtp_host: String,

    #[serde(default = "default_mail_from")]
    pub from: String,
}

fn default_mail_from() -> String {
    "noreply@localhost".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Default filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "restart_coordinator=info,restart_host=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token required by admin routes. Admin routes are open when unset.
    pub api_key: Option<String>,
}
