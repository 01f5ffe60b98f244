//! Note service.
//!
//! A small key/value store served by the demo host. The selected datasource
//! decides where notes live:
//! - `file`: loaded from the JSON file at start, flushed back on dispose
//! - `database`: kept in memory and labelled with the database URL
//! - none selected: kept in memory only

use axum::http::{header::HeaderName, request::Parts, HeaderValue, Method, StatusCode};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::Span;
use uuid::Uuid;

use crate::environment::{DatabaseHandle, DATABASE_BACKEND, FILE_BACKEND};
use crate::lifecycle::error::{DisposeError, InitializationError};
use crate::lifecycle::ShutdownTrigger;
use crate::service::{ExtensionPoint, Preprocessed, Preprocessor, Service, ServiceFactory, StartContext};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Where a note service keeps its notes.
#[derive(Debug, Clone)]
pub enum NoteStore {
    File(PathBuf),
    Database(Arc<DatabaseHandle>),
    Memory,
}

impl NoteStore {
    pub fn label(&self) -> String {
        match self {
            NoteStore::File(path) => format!("file:{}", path.display()),
            NoteStore::Database(handle) => format!("database:{}", handle.url),
            NoteStore::Memory => "memory".to_string(),
        }
    }
}

/// A started note service instance.
pub struct NoteService {
    id: Uuid,
    store: NoteStore,
    notes: DashMap<String, String>,
    mail_from: Option<String>,
    trigger: OnceLock<ShutdownTrigger>,
    disposed: AtomicBool,
    span: Span,
}

impl NoteService {
    pub fn get(&self, key: &str) -> Option<String> {
        self.notes.get(key).map(|r| r.value().clone())
    }

    /// Store a note, returning the previous value.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.notes.insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.notes.remove(key).map(|(_, value)| value)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.notes.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    /// Sender address for change notifications, when a mail session is configured.
    pub fn mail_from(&self) -> Option<&str> {
        self.mail_from.as_deref()
    }

    /// The trigger installed by the coordinator, if process shutdown is available.
    pub fn trigger(&self) -> Option<&ShutdownTrigger> {
        self.trigger.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.notes
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

impl Service for NoteService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn install_shutdown_trigger(&self, trigger: ShutdownTrigger) {
        if self.trigger.set(trigger).is_err() {
            tracing::warn!(parent: &self.span, "Shutdown trigger already installed");
        }
    }

    fn preprocessors(
        &self,
        point: ExtensionPoint,
    ) -> Result<Vec<Arc<dyn Preprocessor>>, InitializationError> {
        if point != ExtensionPoint::REQUEST_PREPROCESSING {
            return Ok(Vec::new());
        }
        Ok(vec![
            Arc::new(RequestIdStamp) as Arc<dyn Preprocessor>,
            Arc::new(MethodGuard),
        ])
    }

    fn dispose(&self) -> Result<(), DisposeError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let NoteStore::File(path) = &self.store {
            let snapshot = self.snapshot();
            write_notes(path, &snapshot)?;
            tracing::info!(parent: &self.span, path = %path.display(), notes = snapshot.len(), "Flushed notes");
        }
        tracing::info!(parent: &self.span, "Note service disposed");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Starts [`NoteService`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoteServiceFactory;

impl ServiceFactory for NoteServiceFactory {
    fn start<'a>(
        &'a self,
        ctx: StartContext<'a>,
    ) -> BoxFuture<'a, Result<Arc<dyn Service>, InitializationError>> {
        Box::pin(async move {
            let store = match ctx.datasource {
                Some(FILE_BACKEND) => {
                    let path = ctx.backend.file_datasource.clone().ok_or_else(|| {
                        InitializationError::Backend("file datasource selected but no path configured".into())
                    })?;
                    NoteStore::File(path)
                }
                Some(DATABASE_BACKEND) => {
                    let handle = ctx.backend.db_datasource.clone().ok_or_else(|| {
                        InitializationError::Backend("database datasource selected but no handle configured".into())
                    })?;
                    NoteStore::Database(handle)
                }
                Some(other) => {
                    return Err(InitializationError::Backend(format!("unknown datasource `{}`", other)));
                }
                None => NoteStore::Memory,
            };

            let notes = match &store {
                NoteStore::File(path) => load_notes(path).await?,
                _ => DashMap::new(),
            };

            let id = Uuid::new_v4();
            let span = tracing::info_span!(
                parent: ctx.span,
                "note_service",
                instance_id = %id,
                generation = ctx.generation
            );
            let mail_from = ctx.backend.mail().map(|mail| mail.from.clone());
            if let Some(from) = &mail_from {
                tracing::info!(parent: &span, from = %from, "Mail notifications enabled");
            }
            tracing::info!(parent: &span, store = %store.label(), notes = notes.len(), "Note service started");

            let service = NoteService {
                id,
                store,
                notes,
                mail_from,
                trigger: OnceLock::new(),
                disposed: AtomicBool::new(false),
                span,
            };
            Ok(Arc::new(service) as Arc<dyn Service>)
        })
    }
}

async fn load_notes(path: &Path) -> Result<DashMap<String, String>, InitializationError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DashMap::new()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(DashMap::new());
    }

    let map: BTreeMap<String, String> = serde_json::from_str(&content).map_err(|e| {
        InitializationError::Backend(format!("corrupt note file {}: {}", path.display(), e))
    })?;
    Ok(map.into_iter().collect())
}

/// Write the notes through a temporary file and rename it into place.
///
/// `dispose` is synchronous and runs on a runtime worker under the write
/// hold. On a multi-thread runtime the worker is handed off with
/// `block_in_place` first; `block_in_place` panics on a current-thread
/// runtime, so there the write runs inline.
fn write_notes(path: &Path, notes: &BTreeMap<String, String>) -> Result<(), DisposeError> {
    let json = serde_json::to_vec_pretty(notes)?;
    let write = || -> io::Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)
    };

    let multi_thread = Handle::try_current()
        .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
        .unwrap_or(false);
    if multi_thread {
        tokio::task::block_in_place(write)?;
    } else {
        write()?;
    }
    Ok(())
}

/// Stamps a request id on requests that arrive without one.
pub struct RequestIdStamp;

impl Preprocessor for RequestIdStamp {
    fn name(&self) -> &str {
        "request-id"
    }

    fn preprocess(&self, parts: &mut Parts) -> Preprocessed {
        if !parts.headers.contains_key(X_REQUEST_ID) {
            if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
                parts.headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
            }
        }
        Preprocessed::Continue
    }
}

/// Rejects methods the note routes do not serve.
pub struct MethodGuard;

impl Preprocessor for MethodGuard {
    fn name(&self) -> &str {
        "method-guard"
    }

    fn preprocess(&self, parts: &mut Parts) -> Preprocessed {
        match parts.method {
            Method::GET | Method::HEAD | Method::PUT | Method::POST | Method::DELETE => Preprocessed::Continue,
            _ => Preprocessed::Reject(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{BackendContext, MailSession};
    use axum::http::Request;

    async fn start(backend: BackendContext, datasource: Option<&str>) -> Result<Arc<dyn Service>, InitializationError> {
        let span = Span::none();
        let backend = Arc::new(backend);
        NoteServiceFactory
            .start(StartContext { span: &span, backend: &backend, datasource, generation: 1 })
            .await
    }

    fn notes(service: &Arc<dyn Service>) -> &NoteService {
        service.as_any().downcast_ref::<NoteService>().unwrap()
    }

    #[tokio::test]
    async fn test_file_store_survives_dispose_and_restart() {
        let dir = tempfile::tempdir().unwrap();
        let backend = BackendContext {
            file_datasource: Some(dir.path().join("notes.json")),
            ..Default::default()
        };

        let first = start(backend.clone(), Some(FILE_BACKEND)).await.unwrap();
        notes(&first).put("greeting", "hello");
        first.dispose().unwrap();
        assert!(notes(&first).is_disposed());

        let second = start(backend, Some(FILE_BACKEND)).await.unwrap();
        assert_eq!(notes(&second).get("greeting").as_deref(), Some("hello"));
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_flush_on_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        let backend = BackendContext { file_datasource: Some(path.clone()), ..Default::default() };

        let service = start(backend, Some(FILE_BACKEND)).await.unwrap();
        notes(&service).put("k", "v");
        service.dispose().unwrap();

        let saved: BTreeMap<String, String> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.get("k").map(String::as_str), Some("v"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_mail_sender_taken_from_session() {
        let session: crate::environment::Resource = Arc::new(MailSession {
            smtp_host: "smtp.local".into(),
            from: "notes@local".into(),
        });
        let backend = BackendContext { mail_session: Some(session), ..Default::default() };

        let service = start(backend, None).await.unwrap();
        assert_eq!(notes(&service).mail_from(), Some("notes@local"));

        let service = start(BackendContext::default(), None).await.unwrap();
        assert_eq!(notes(&service).mail_from(), None);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let service = start(BackendContext::default(), None).await.unwrap();
        assert!(service.dispose().is_ok());
        assert!(service.dispose().is_ok());
    }

    #[tokio::test]
    async fn test_selected_backend_must_be_configured() {
        let err = start(BackendContext::default(), Some(DATABASE_BACKEND)).await.err().unwrap();
        assert!(matches!(err, InitializationError::Backend(_)));

        let err = start(BackendContext::default(), Some("ldap")).await.err().unwrap();
        assert!(err.to_string().contains("unknown datasource `ldap`"));
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(&path, "{not json").unwrap();

        let backend = BackendContext { file_datasource: Some(path), ..Default::default() };
        let err = start(backend, Some(FILE_BACKEND)).await.err().unwrap();
        assert!(matches!(err, InitializationError::Backend(_)));
    }

    #[tokio::test]
    async fn test_database_store_is_labelled() {
        let backend = BackendContext {
            db_datasource: Some(Arc::new(DatabaseHandle::new("postgres://db/notes"))),
            ..Default::default()
        };
        let service = start(backend, Some(DATABASE_BACKEND)).await.unwrap();
        assert_eq!(notes(&service).store().label(), "database:postgres://db/notes");
    }

    #[test]
    fn test_request_id_stamped_only_when_missing() {
        let (mut parts, _) = Request::new(()).into_parts();
        assert_eq!(RequestIdStamp.preprocess(&mut parts), Preprocessed::Continue);
        assert!(parts.headers.contains_key(X_REQUEST_ID));

        let (mut parts, _) = Request::builder().header(X_REQUEST_ID, "abc").body(()).unwrap().into_parts();
        RequestIdStamp.preprocess(&mut parts);
        assert_eq!(parts.headers[X_REQUEST_ID], "abc");
    }

    #[test]
    fn test_method_guard() {
        let (mut parts, _) = Request::builder().method(Method::PATCH).body(()).unwrap().into_parts();
        assert!(matches!(MethodGuard.preprocess(&mut parts), Preprocessed::Reject(StatusCode::METHOD_NOT_ALLOWED, _)));
    }
}
