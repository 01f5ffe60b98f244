//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject datasource selections the environment cannot satisfy
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HostConfig → Result<(), Vec<ValidationError>>
//! - Placeholder selections (`${...}`) are left for runtime inference

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::HostConfig;
use crate::environment::{DATABASE_BACKEND, FILE_BACKEND};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid address `{value}` for {field}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("unknown datasource `{0}` (expected `file` or `database`)")]
    UnknownDatasource(String),

    #[error("datasource `{0}` selected but its backend is not configured")]
    MissingBackend(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "server.bind_address",
            value: config.server.bind_address.clone(),
        });
    }
    if config.restart.write_lock_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout { field: "restart.write_lock_timeout_secs" });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let env = &config.environment;
    match env.datasource.as_deref().map(str::trim) {
        None | Some("") => {}
        Some(placeholder) if placeholder.starts_with("${") => {}
        Some(FILE_BACKEND) => {
            if env.file_datasource.as_deref().map_or(true, |p| p.trim().is_empty()) {
                errors.push(ValidationError::MissingBackend(FILE_BACKEND));
            }
        }
        Some(DATABASE_BACKEND) => {
            if env.database.is_none() {
                errors.push(ValidationError::MissingBackend(DATABASE_BACKEND));
            }
        }
        Some(other) => errors.push(ValidationError::UnknownDatasource(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
