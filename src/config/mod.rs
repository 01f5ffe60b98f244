//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HostConfig (validated, immutable)
//!     → environment::from_config builds the environment lookup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a restart reuses the resolved environment
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, DatabaseConfig, EnvironmentConfig, HostConfig, LogFormat, MailConfig,
    ObservabilityConfig, RestartConfig, ServerConfig,
};
pub use validation::{validate_config, ValidationError};
