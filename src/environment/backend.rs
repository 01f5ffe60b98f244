//! Backend context resolution.
//!
//! # Responsibilities
//! - Look up the file datasource, database handle, and mail session
//! - Decide which datasource is selected when none is configured
//!
//! # Design Decisions
//! - Resolution never fails on an absent or mistyped optional resource;
//!   it logs and treats it as absent
//! - An empty file path counts as absent
//! - Neither backend configured is only a warning: the service may fall
//!   back to its own default at start time

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::environment::lookup::{EnvironmentLookup, LookupError, Resource};
use crate::environment::resources::{DatabaseHandle, MailSession};
use crate::environment::{
    DATABASE_BACKEND, DB_DATASOURCE, FILE_BACKEND, FILE_DATASOURCE, MAIL_SESSION, SELECTED_DATASOURCE,
};

/// Storage and mail resources available to a service instance.
#[derive(Clone, Default)]
pub struct BackendContext {
    pub file_datasource: Option<PathBuf>,
    pub db_datasource: Option<Arc<DatabaseHandle>>,
    pub mail_session: Option<Resource>,
}

impl BackendContext {
    /// Resolve the backend context from an environment snapshot.
    pub fn resolve(env: &dyn EnvironmentLookup) -> Result<Self, LookupError> {
        let file_datasource = env
            .lookup_env_string(FILE_DATASOURCE, false)?
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let db_datasource = match env.lookup_resource(DB_DATASOURCE, false)? {
            Some(resource) => match resource.downcast::<DatabaseHandle>() {
                Ok(handle) => Some(handle),
                Err(_) => {
                    tracing::error!(
                        resource = DB_DATASOURCE,
                        "Passed resource is not a database handle, ignoring it"
                    );
                    None
                }
            },
            None => None,
        };

        let mail_session = env.lookup_resource(MAIL_SESSION, false)?;
        if let Some(session) = &mail_session {
            match session.downcast_ref::<MailSession>() {
                Some(mail) => tracing::info!(smtp_host = %mail.smtp_host, "Configured mail service via environment"),
                None => tracing::info!("Configured mail service via environment"),
            }
        }

        Ok(Self {
            file_datasource,
            db_datasource,
            mail_session,
        })
    }

    /// Name of the datasource the service should use.
    ///
    /// An explicit, resolved selection wins. Otherwise the database backend is
    /// preferred over the file backend; with neither, `None` is returned.
    pub fn select_datasource(&self, env: &dyn EnvironmentLookup) -> Result<Option<String>, LookupError> {
        let configured = env.lookup_env_string(SELECTED_DATASOURCE, false)?;
        if let Some(name) = configured.as_deref().map(str::trim) {
            if !name.is_empty() && !name.starts_with("${") {
                return Ok(Some(name.to_string()));
            }
        }

        let inferred = if self.db_datasource.is_some() {
            Some(DATABASE_BACKEND.to_string())
        } else if self.file_datasource.is_some() {
            Some(FILE_BACKEND.to_string())
        } else {
            tracing::warn!("Neither file nor database datasource configured");
            None
        };

        tracing::info!(
            datasource = ?inferred,
            db = ?self.db_datasource.as_ref().map(|db| db.url.as_str()),
            file = ?self.file_datasource,
            "Inferred datasource from environment"
        );
        Ok(inferred)
    }

    pub fn mail(&self) -> Option<&MailSession> {
        self.mail_session.as_ref().and_then(|session| session.downcast_ref::<MailSession>())
    }
}

impl fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendContext")
            .field("file_datasource", &self.file_datasource)
            .field("db_datasource", &self.db_datasource)
            .field("mail_session", &self.mail_session.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MapEnvironment;
    use std::io;
    use std::sync::Mutex;

    fn select(env: &MapEnvironment) -> (BackendContext, Option<String>) {
        let ctx = BackendContext::resolve(env).unwrap();
        let selected = ctx.select_datasource(env).unwrap();
        (ctx, selected)
    }

    #[test]
    fn test_database_inferred_when_selection_empty() {
        let env = MapEnvironment::new()
            .with_resource(DB_DATASOURCE, DatabaseHandle::new("postgres://localhost/app"))
            .with_string(SELECTED_DATASOURCE, "");

        let (ctx, selected) = select(&env);
        assert!(ctx.file_datasource.is_none());
        assert_eq!(selected.as_deref(), Some(DATABASE_BACKEND));
    }

    #[test]
    fn test_file_inferred_when_selection_is_placeholder() {
        let env = MapEnvironment::new()
            .with_string(FILE_DATASOURCE, "/var/lib/app/data.json")
            .with_string(SELECTED_DATASOURCE, "${datasource}");

        let (ctx, selected) = select(&env);
        assert_eq!(ctx.file_datasource, Some(PathBuf::from("/var/lib/app/data.json")));
        assert_eq!(selected.as_deref(), Some(FILE_BACKEND));
    }

    #[test]
    fn test_database_preferred_over_file() {
        let env = MapEnvironment::new()
            .with_string(FILE_DATASOURCE, "data.json")
            .with_resource(DB_DATASOURCE, DatabaseHandle::new("postgres://db"));

        let (_, selected) = select(&env);
        assert_eq!(selected.as_deref(), Some(DATABASE_BACKEND));
    }

    /// Run `f` and return whatever it logged, without ANSI colors.
    fn with_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || LogWriter(writer.clone()))
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned();
        (out, logs)
    }

    struct LogWriter(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_nothing_configured_selects_nothing() {
        let ((ctx, selected), logs) = with_logs(|| select(&MapEnvironment::new()));
        assert!(ctx.file_datasource.is_none());
        assert!(ctx.db_datasource.is_none());
        assert!(selected.is_none());

        let warning = logs
            .lines()
            .find(|line| line.contains("Neither file nor database datasource configured"))
            .expect("missing backends must be logged");
        assert!(warning.contains("WARN"));
    }

    #[test]
    fn test_configured_backend_does_not_warn() {
        let env = MapEnvironment::new().with_string(FILE_DATASOURCE, "data.json");
        let (_, logs) = with_logs(|| select(&env));
        assert!(!logs.contains("Neither file nor database datasource configured"));
        assert!(logs.contains("Inferred datasource from environment"));
    }

    #[test]
    fn test_explicit_selection_wins() {
        let env = MapEnvironment::new()
            .with_resource(DB_DATASOURCE, DatabaseHandle::new("postgres://db"))
            .with_string(SELECTED_DATASOURCE, " file ");

        let (_, selected) = select(&env);
        assert_eq!(selected.as_deref(), Some("file"));
    }

    #[test]
    fn test_mistyped_database_resource_is_ignored() {
        let env = MapEnvironment::new().with_resource(DB_DATASOURCE, "not a handle".to_string());

        let ((ctx, selected), logs) = with_logs(|| select(&env));
        assert!(ctx.db_datasource.is_none());
        assert!(selected.is_none());
        assert!(logs.contains("Passed resource is not a database handle"));
    }

    #[test]
    fn test_empty_file_path_is_absent() {
        let env = MapEnvironment::new().with_string(FILE_DATASOURCE, "  ");
        let (ctx, _) = select(&env);
        assert!(ctx.file_datasource.is_none());
    }

    #[test]
    fn test_mail_session_exposed() {
        let env = MapEnvironment::new().with_resource(
            MAIL_SESSION,
            MailSession { smtp_host: "smtp.local".into(), from: "app@local".into() },
        );
        let ctx = BackendContext::resolve(&env).unwrap();
        assert_eq!(ctx.mail().map(|m| m.smtp_host.as_str()), Some("smtp.local"));
    }
}
