//! Service instance contract.
//!
//! # Data Flow
//! ```text
//! RestartCoordinator
//!     → ServiceFactory::start(StartContext)   (backend context + selected datasource)
//!     → Arc<dyn Service>                       (installed in the restart lock's slot)
//!     → Service::preprocessors(REQUEST_PREPROCESSING)
//!     → PreprocessorSet                        (read by the hosting environment per request)
//!
//! On shutdown:
//!     ShutdownTrigger (write lock held) → Service::dispose()
//! ```
//!
//! # Design Decisions
//! - Instances are shared as `Arc<dyn Service>`; request code only obtains one
//!   through a read hold, so it never sees a disposed-but-installed instance
//! - `dispose` reports errors instead of panicking; the coordinator logs them
//! - Factories return boxed futures so the coordinator stays object-safe

pub mod notes;

use axum::http::{request::Parts, StatusCode};
use futures_util::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::Span;
use uuid::Uuid;

use crate::environment::BackendContext;
use crate::lifecycle::error::{DisposeError, InitializationError};
use crate::lifecycle::ShutdownTrigger;

/// A named slot where a service registers request-processing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionPoint(&'static str);

impl ExtensionPoint {
    /// Preprocessors run by the hosting environment before every request.
    pub const REQUEST_PREPROCESSING: ExtensionPoint = ExtensionPoint("request-preprocessing");
}

impl fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Result of running a preprocessor over a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preprocessed {
    /// Hand the request to the next preprocessor.
    Continue,
    /// Answer immediately with the given status and body.
    Reject(StatusCode, String),
}

/// Request-preprocessing capability registered by a service instance.
pub trait Preprocessor: Send + Sync {
    fn name(&self) -> &str;

    fn preprocess(&self, parts: &mut Parts) -> Preprocessed;
}

/// Ordered, read-only collection of preprocessors.
#[derive(Clone)]
pub struct PreprocessorSet(Arc<[Arc<dyn Preprocessor>]>);

impl Default for PreprocessorSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PreprocessorSet {
    pub fn new(preprocessors: Vec<Arc<dyn Preprocessor>>) -> Self {
        Self(preprocessors.into())
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run every preprocessor in order, stopping at the first rejection.
    pub fn apply(&self, parts: &mut Parts) -> Preprocessed {
        for preprocessor in self.0.iter() {
            if let Preprocessed::Reject(status, body) = preprocessor.preprocess(parts) {
                tracing::debug!(preprocessor = preprocessor.name(), status = %status, "Request rejected by preprocessor");
                return Preprocessed::Reject(status, body);
            }
        }
        Preprocessed::Continue
    }
}

impl fmt::Debug for PreprocessorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter().map(|p| p.name())).finish()
    }
}

/// The live request-serving object.
pub trait Service: Send + Sync + 'static {
    /// Unique id of this instance.
    fn id(&self) -> Uuid;

    /// Receive the trigger used to request a stop or restart from inside the service.
    ///
    /// Only called when a process-shutdown command is available.
    fn install_shutdown_trigger(&self, trigger: ShutdownTrigger) {
        let _ = trigger;
    }

    /// Preprocessors this instance registers at `point`, in order.
    fn preprocessors(
        &self,
        point: ExtensionPoint,
    ) -> Result<Vec<Arc<dyn Preprocessor>>, InitializationError>;

    /// Release every resource held by the instance.
    fn dispose(&self) -> Result<(), DisposeError>;

    fn as_any(&self) -> &dyn Any;
}

/// Inputs handed to a factory for one start attempt.
pub struct StartContext<'a> {
    /// Parent span for everything the instance logs.
    pub span: &'a Span,
    pub backend: &'a Arc<BackendContext>,
    /// Name of the selected datasource, if one was configured or inferred.
    pub datasource: Option<&'a str>,
    /// Generation number the instance will be installed as.
    pub generation: u64,
}

/// Constructs and starts service instances.
pub trait ServiceFactory: Send + Sync + 'static {
    /// Start a new instance.
    ///
    /// A failed start must not leave partially initialized global state behind.
    fn start<'a>(
        &'a self,
        ctx: StartContext<'a>,
    ) -> BoxFuture<'a, Result<Arc<dyn Service>, InitializationError>>;
}

/// The current instance as seen by one admitted request.
#[derive(Clone)]
pub struct ActiveService {
    pub instance: Arc<dyn Service>,
    pub preprocessors: PreprocessorSet,
    pub generation: u64,
}

impl ActiveService {
    /// Borrow the instance as its concrete type.
    pub fn downcast_ref<T: Service>(&self) -> Option<&T> {
        self.instance.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for ActiveService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveService")
            .field("id", &self.instance.id())
            .field("generation", &self.generation)
            .field("preprocessors", &self.preprocessors)
            .finish()
    }
}
