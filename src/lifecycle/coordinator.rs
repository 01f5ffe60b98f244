//! Restart coordinator.
//!
//! # Responsibilities
//! - Resolve the backend context once, at construction
//! - Start the service instance and publish its preprocessors
//! - Stop or restart the instance under the write side of the restart lock
//! - Admit request work under the read side
//!
//! # Design Decisions
//! - The instance slot lives inside the restart lock; nothing outside a
//!   read hold can observe it
//! - A failed restart degrades to a full stop, never to a half-started instance
//! - Start and stop/restart run on spawned tasks; dropping the caller's
//!   future never leaves the slot empty with the state mid-transition
//! - `shutdown` never returns an error: every failure is logged and folded
//!   into a `ShutdownOutcome`

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Span};

use crate::environment::{BackendContext, EnvironmentLookup, LookupError, SHUTDOWN_COMMAND};
use crate::lifecycle::error::{InitializationError, LockError, ServeError};
use crate::lifecycle::lock::{RestartLock, ServiceSlot};
use crate::lifecycle::shutdown::ShutdownCommand;
use crate::lifecycle::state::ServerState;
use crate::lifecycle::trigger::{ShutdownOutcome, ShutdownTrigger};
use crate::observability::metrics;
use crate::service::{ActiveService, ExtensionPoint, PreprocessorSet, Service, ServiceFactory, StartContext};

/// Default bound on waiting for in-flight requests to drain.
pub const DEFAULT_WRITE_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Owns the service instance and coordinates its lifecycle.
#[derive(Clone)]
pub struct RestartCoordinator {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    span: Span,
    backend: Arc<BackendContext>,
    datasource: Option<String>,
    factory: Arc<dyn ServiceFactory>,
    lock: RestartLock,
    state: AtomicU8,
    shutdown_command: Option<ShutdownCommand>,
    write_lock_timeout: Duration,
    trigger: ShutdownTrigger,
}

/// Builder for [`RestartCoordinator`].
pub struct CoordinatorBuilder {
    factory: Arc<dyn ServiceFactory>,
    span: Option<Span>,
    write_lock_timeout: Duration,
    shutdown_command: Option<ShutdownCommand>,
}

impl CoordinatorBuilder {
    /// Parent span for everything the coordinator and its instances log.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn write_lock_timeout(mut self, timeout: Duration) -> Self {
        self.write_lock_timeout = timeout;
        self
    }

    /// Use `command` instead of looking one up in the environment.
    pub fn shutdown_command(mut self, command: ShutdownCommand) -> Self {
        self.shutdown_command = Some(command);
        self
    }

    /// Resolve the environment and build the coordinator in the `Stopped` state.
    pub fn build(self, env: &dyn EnvironmentLookup) -> Result<RestartCoordinator, InitializationError> {
        let span = self.span.unwrap_or_else(|| tracing::info_span!("restart_coordinator"));

        let (backend, datasource, shutdown_command) = span.in_scope(|| {
            let shutdown_command = match self.shutdown_command {
                Some(command) => Some(command),
                None => lookup_shutdown_command(env)?,
            };
            let backend = BackendContext::resolve(env)?;
            let datasource = backend.select_datasource(env)?;
            Ok::<_, LookupError>((backend, datasource, shutdown_command))
        })?;

        let inner = Arc::new_cyclic(|weak| Inner {
            span,
            backend: Arc::new(backend),
            datasource,
            factory: self.factory,
            lock: RestartLock::new(),
            state: AtomicU8::new(ServerState::Stopped as u8),
            shutdown_command,
            write_lock_timeout: self.write_lock_timeout,
            trigger: ShutdownTrigger { inner: weak.clone() },
        });
        metrics::record_state(ServerState::Stopped);

        Ok(RestartCoordinator { inner })
    }
}

fn lookup_shutdown_command(env: &dyn EnvironmentLookup) -> Result<Option<ShutdownCommand>, LookupError> {
    let Some(resource) = env.lookup_resource(SHUTDOWN_COMMAND, false)? else {
        return Ok(None);
    };
    match resource.downcast_ref::<ShutdownCommand>() {
        Some(command) => Ok(Some(command.clone())),
        None => {
            tracing::error!(resource = SHUTDOWN_COMMAND, "Passed resource is not a shutdown command, ignoring it");
            Ok(None)
        }
    }
}

impl RestartCoordinator {
    pub fn builder(factory: Arc<dyn ServiceFactory>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            factory,
            span: None,
            write_lock_timeout: DEFAULT_WRITE_LOCK_TIMEOUT,
            shutdown_command: None,
        }
    }

    /// Build a coordinator with default settings.
    pub fn new(
        env: &dyn EnvironmentLookup,
        factory: Arc<dyn ServiceFactory>,
    ) -> Result<Self, InitializationError> {
        Self::builder(factory).build(env)
    }

    /// Start the service instance.
    ///
    /// On failure the process-shutdown command, if any, has been run and the
    /// coordinator is `Stopped`. Calling this while an instance is live
    /// returns that instance.
    pub async fn start_server(&self) -> Result<Arc<dyn Service>, InitializationError> {
        // Runs to completion even if this future is dropped.
        let inner = self.inner.clone();
        let span = inner.span.clone();
        let task = tokio::spawn(inner.start_locked().instrument(span));
        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(parent: &self.inner.span, error = %e, "Start task failed");
                Err(InitializationError::Service(format!("start task failed: {}", e)))
            }
        }
    }

    /// Stop the current instance without restarting it.
    ///
    /// Same as `trigger().shutdown(false)`.
    pub async fn stop_server(&self) -> ShutdownOutcome {
        Inner::shutdown(&self.inner, false).await
    }

    /// Admit one unit of request work.
    ///
    /// `f` runs with a read hold registered for the current task, so a
    /// shutdown trigger invoked from inside it releases that hold first.
    /// The hold is released on every exit path.
    pub async fn serve<F, Fut, T>(&self, f: F) -> Result<T, ServeError>
    where
        F: FnOnce(ActiveService) -> Fut,
        Fut: Future<Output = T>,
    {
        let hold = self.inner.lock.read().await;
        let Some(active) = hold.active() else {
            return Err(ServeError::Unavailable { state: self.state() });
        };
        Ok(RestartLock::scope(hold, f(active)).await)
    }

    /// The live instance, read under the restart lock.
    pub async fn server(&self) -> Option<Arc<dyn Service>> {
        self.inner.lock.read().await.instance().cloned()
    }

    /// Preprocessors of the live instance.
    pub async fn preprocessors(&self) -> PreprocessorSet {
        self.inner.lock.read().await.preprocessors().clone()
    }

    /// Number of instances started so far.
    pub async fn generation(&self) -> u64 {
        self.inner.lock.read().await.generation()
    }

    pub fn state(&self) -> ServerState {
        self.inner.state()
    }

    pub fn restart_lock(&self) -> &RestartLock {
        &self.inner.lock
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        self.inner.trigger.clone()
    }

    pub fn backend(&self) -> &Arc<BackendContext> {
        &self.inner.backend
    }

    /// Selected or inferred datasource name.
    pub fn datasource(&self) -> Option<&str> {
        self.inner.datasource.as_deref()
    }

    pub fn has_shutdown_command(&self) -> bool {
        self.inner.shutdown_command.is_some()
    }
}

impl fmt::Debug for RestartCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestartCoordinator")
            .field("state", &self.state())
            .field("datasource", &self.inner.datasource)
            .field("backend", &self.inner.backend)
            .field("write_lock_timeout", &self.inner.write_lock_timeout)
            .finish()
    }
}

impl Inner {
    fn state(&self) -> ServerState {
        ServerState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
        metrics::record_state(state);
    }

    /// Start a new instance into an empty slot. The caller holds the write side.
    async fn start_into(&self, slot: &mut ServiceSlot) -> Result<Arc<dyn Service>, InitializationError> {
        let ctx = StartContext {
            span: &self.span,
            backend: &self.backend,
            datasource: self.datasource.as_deref(),
            generation: slot.generation() + 1,
        };

        let service = match self.factory.start(ctx).await {
            Ok(service) => service,
            Err(e) => {
                tracing::error!(error = %e, "Error during initialization, see logs for details");
                self.set_state(ServerState::Stopped);
                metrics::record_start("failed");
                return Err(e);
            }
        };

        if self.shutdown_command.is_some() {
            service.install_shutdown_trigger(self.trigger.clone());
        }

        let preprocessors = match service.preprocessors(ExtensionPoint::REQUEST_PREPROCESSING) {
            Ok(preprocessors) => PreprocessorSet::new(preprocessors),
            Err(e) => {
                tracing::error!(
                    instance_id = %service.id(),
                    error = %e,
                    "Error during initialization, see logs for details"
                );
                self.dispose_instance(&service);
                self.set_state(ServerState::Stopped);
                metrics::record_start("failed");
                return Err(e);
            }
        };

        let generation = slot.install(service.clone(), preprocessors);
        self.set_state(ServerState::Running);
        metrics::record_start("ok");
        tracing::info!(
            instance_id = %service.id(),
            generation,
            datasource = ?self.datasource,
            "Server started"
        );
        Ok(service)
    }

    fn dispose_instance(&self, service: &Arc<dyn Service>) {
        match service.dispose() {
            Ok(()) => tracing::debug!(instance_id = %service.id(), "Instance disposed"),
            Err(e) => {
                tracing::error!(instance_id = %service.id(), error = %e, "Error while disposing server instance");
                metrics::record_dispose_error();
            }
        }
    }

    fn run_shutdown_command(&self) {
        if let Some(command) = &self.shutdown_command {
            tracing::info!("Running process shutdown command");
            command.run();
        }
    }

    async fn start_locked(self: Arc<Self>) -> Result<Arc<dyn Service>, InitializationError> {
        let mut slot = self.lock.write_timeout(self.write_lock_timeout).await?;
        if let Some(current) = slot.instance() {
            tracing::warn!(instance_id = %current.id(), "Server already running, start ignored");
            return Ok(current.clone());
        }

        self.set_state(ServerState::Starting);
        match self.start_into(&mut slot).await {
            Ok(service) => Ok(service),
            Err(e) => {
                self.run_shutdown_command();
                Err(e)
            }
        }
    }

    /// The stop/restart sequence behind [`ShutdownTrigger::shutdown`].
    ///
    /// The caller's read hold is released on the calling task. Everything
    /// after that runs on a spawned task, so once the write side is
    /// requested the sequence completes even if the caller is dropped.
    pub(crate) async fn shutdown(this: &Arc<Self>, restart: bool) -> ShutdownOutcome {
        match RestartLock::release_current_read() {
            Ok(()) => tracing::debug!(parent: &this.span, "Released the caller's read hold"),
            Err(LockError::NotHeld) => {
                tracing::warn!(parent: &this.span, error = %LockError::NotHeld, "Error unlocking read for restart")
            }
            Err(e) => {
                tracing::error!(parent: &this.span, error = %e, "Can't restart server");
                return ShutdownOutcome::Aborted;
            }
        }

        let span = this.span.clone();
        let task = tokio::spawn(this.clone().shutdown_locked(restart).instrument(span));
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(parent: &this.span, error = %e, restart, "Shutdown task failed");
                ShutdownOutcome::Aborted
            }
        }
    }

    async fn shutdown_locked(self: Arc<Self>, restart: bool) -> ShutdownOutcome {
        let kind = if restart { "restart" } else { "stop" };

        let mut slot = match self.lock.write_timeout(self.write_lock_timeout).await {
            Ok(slot) => slot,
            Err(e) => {
                tracing::error!(error = %e, restart, "Can't restart server");
                metrics::record_lock_timeout();
                metrics::record_shutdown(kind, ShutdownOutcome::Aborted.as_str());
                return ShutdownOutcome::Aborted;
            }
        };

        tracing::info!(restart, "Stopping server");
        self.set_state(ServerState::Disposing);
        if let Some(service) = slot.take() {
            self.dispose_instance(&service);
        }

        let outcome = if restart {
            self.set_state(ServerState::Restarting);
            tracing::info!("Restarting server");
            match self.start_into(&mut slot).await {
                Ok(_) => ShutdownOutcome::Restarted,
                Err(e) => {
                    tracing::error!(error = %e, "Error while restarting server");
                    ShutdownOutcome::RestartFailed
                }
            }
        } else {
            ShutdownOutcome::Stopped
        };

        if outcome != ShutdownOutcome::Restarted {
            self.set_state(ServerState::Stopped);
            self.run_shutdown_command();
        }
        drop(slot);

        metrics::record_shutdown(kind, outcome.as_str());
        outcome
    }
}
