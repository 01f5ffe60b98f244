//! Environment subsystem.
//!
//! # Data Flow
//! ```text
//! [environment] config section (or an embedder's own lookup)
//!     → lookup.rs (EnvironmentLookup: named strings + opaque resources)
//!     → backend.rs (BackendContext::resolve, select_datasource)
//!     → RestartCoordinator (owns the resolved context for its lifetime)
//! ```
//!
//! # Design Decisions
//! - Resources are `Arc<dyn Any>` and downcast by the consumer
//! - `${NAME}` values are substituted from the process environment when set;
//!   otherwise the literal placeholder is kept so resolution can detect it

pub mod backend;
pub mod lookup;
pub mod resources;

pub use backend::BackendContext;
pub use lookup::{EnvironmentLookup, LookupError, MapEnvironment, Resource};
pub use resources::{DatabaseHandle, MailSession};

use crate::config::EnvironmentConfig;

/// Path of the file-backed datasource.
pub const FILE_DATASOURCE: &str = "file_datasource";
/// Database handle resource.
pub const DB_DATASOURCE: &str = "db/datasource";
/// Mail session resource.
pub const MAIL_SESSION: &str = "mail/session";
/// Name of the datasource the service should use.
pub const SELECTED_DATASOURCE: &str = "datasource";
/// Process-shutdown command resource.
pub const SHUTDOWN_COMMAND: &str = "shutdown_command";

pub const DATABASE_BACKEND: &str = "database";
pub const FILE_BACKEND: &str = "file";

/// Build an environment from the `[environment]` config section.
pub fn from_config(config: &EnvironmentConfig) -> MapEnvironment {
    let mut env = MapEnvironment::new();

    for (name, value) in &config.entries {
        env.insert_string(name.clone(), substitute(value));
    }
    if let Some(path) = &config.file_datasource {
        env.insert_string(FILE_DATASOURCE, substitute(path));
    }
    if let Some(datasource) = &config.datasource {
        env.insert_string(SELECTED_DATASOURCE, substitute(datasource));
    }
    if let Some(database) = &config.database {
        env.insert_resource(DB_DATASOURCE, DatabaseHandle::new(substitute(&database.url)));
    }
    if let Some(mail) = &config.mail {
        env.insert_resource(
            MAIL_SESSION,
            MailSession {
                smtp_host: substitute(&mail.smtp_host),
                from: substitute(&mail.from),
            },
        );
    }

    env
}

/// Replace a whole-value `${NAME}` with the process variable `NAME`, if set.
fn substitute(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(name) = trimmed.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        if let Ok(resolved) = std::env::var(name) {
            return resolved;
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, EnvironmentConfig};

    #[test]
    fn test_from_config_publishes_resources() {
        let config = EnvironmentConfig {
            file_datasource: Some("notes.json".into()),
            database: Some(DatabaseConfig { url: "postgres://db/app".into() }),
            ..Default::default()
        };
        let env = from_config(&config);

        assert_eq!(
            env.lookup_env_string(FILE_DATASOURCE, true).unwrap().as_deref(),
            Some("notes.json")
        );
        let db = env.lookup_resource(DB_DATASOURCE, true).unwrap().unwrap();
        assert_eq!(db.downcast_ref::<DatabaseHandle>().map(|h| h.url.as_str()), Some("postgres://db/app"));
    }

    #[test]
    fn test_unset_placeholder_is_kept() {
        assert_eq!(
            substitute("${RESTART_COORDINATOR_SURELY_UNSET_VAR}"),
            "${RESTART_COORDINATOR_SURELY_UNSET_VAR}"
        );
        assert_eq!(substitute("plain"), "plain");
    }

    #[test]
    fn test_set_placeholder_is_substituted() {
        // PATH is set in every test environment.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(substitute("${PATH}"), path);
    }
}
