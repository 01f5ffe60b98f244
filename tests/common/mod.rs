//! Shared fakes for the coordinator and host integration tests.

use axum::http::request::Parts;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use restart_coordinator::environment::MapEnvironment;
use restart_coordinator::lifecycle::{
    DisposeError, InitializationError, RestartCoordinator, ShutdownCommand, ShutdownTrigger,
};
use restart_coordinator::service::{
    ExtensionPoint, Preprocessed, Preprocessor, Service, ServiceFactory, StartContext,
};

/// Counters shared between a [`FakeFactory`] and every instance it starts.
#[derive(Default)]
pub struct Probe {
    pub starts: AtomicUsize,
    pub disposes: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub disposed_while_busy: AtomicBool,
}

impl Probe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn disposes(&self) -> usize {
        self.disposes.load(Ordering::SeqCst)
    }

    /// Mark one unit of request work as running until the guard drops.
    pub fn enter(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(self.clone())
    }
}

pub struct InFlight(Arc<Probe>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeService {
    id: Uuid,
    pub generation: u64,
    probe: Arc<Probe>,
    fail_preprocessors: bool,
    trigger: Mutex<Option<ShutdownTrigger>>,
}

impl FakeService {
    pub fn trigger(&self) -> Option<ShutdownTrigger> {
        self.trigger.lock().unwrap().clone()
    }
}

struct Tag;

impl Preprocessor for Tag {
    fn name(&self) -> &str {
        "tag"
    }

    fn preprocess(&self, parts: &mut Parts) -> Preprocessed {
        parts.headers.insert("x-fake", "1".parse().unwrap());
        Preprocessed::Continue
    }
}

impl Service for FakeService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn install_shutdown_trigger(&self, trigger: ShutdownTrigger) {
        *self.trigger.lock().unwrap() = Some(trigger);
    }

    fn preprocessors(
        &self,
        point: ExtensionPoint,
    ) -> Result<Vec<Arc<dyn Preprocessor>>, InitializationError> {
        if self.fail_preprocessors {
            return Err(InitializationError::Extension {
                point: point.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(vec![Arc::new(Tag) as Arc<dyn Preprocessor>])
    }

    fn dispose(&self) -> Result<(), DisposeError> {
        if self.probe.in_flight.load(Ordering::SeqCst) != 0 {
            self.probe.disposed_while_busy.store(true, Ordering::SeqCst);
        }
        self.probe.disposes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory with injectable start and preprocessor failures.
#[derive(Default)]
pub struct FakeFactory {
    pub probe: Arc<Probe>,
    /// 1-based start attempts that fail.
    fail_starts: Mutex<HashSet<usize>>,
    /// 1-based start attempts that sleep before completing.
    delays: Mutex<HashMap<usize, Duration>>,
    fail_preprocessors: AtomicBool,
}

#[allow(dead_code)]
impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_start(&self, attempt: usize) {
        self.fail_starts.lock().unwrap().insert(attempt);
    }

    pub fn delay_start(&self, attempt: usize, delay: Duration) {
        self.delays.lock().unwrap().insert(attempt, delay);
    }

    pub fn fail_preprocessors(&self) {
        self.fail_preprocessors.store(true, Ordering::SeqCst);
    }
}

impl ServiceFactory for FakeFactory {
    fn start<'a>(
        &'a self,
        ctx: StartContext<'a>,
    ) -> BoxFuture<'a, Result<Arc<dyn Service>, InitializationError>> {
        Box::pin(async move {
            let attempt = self.probe.starts.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = self.delays.lock().unwrap().get(&attempt).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_starts.lock().unwrap().contains(&attempt) {
                return Err(InitializationError::Service(format!("injected failure on start {}", attempt)));
            }
            Ok(Arc::new(FakeService {
                id: Uuid::new_v4(),
                generation: ctx.generation,
                probe: self.probe.clone(),
                fail_preprocessors: self.fail_preprocessors.load(Ordering::SeqCst),
                trigger: Mutex::new(None),
            }) as Arc<dyn Service>)
        })
    }
}

/// A shutdown command that counts its invocations.
#[allow(dead_code)]
pub fn counting_command() -> (ShutdownCommand, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let command = ShutdownCommand::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (command, count)
}

/// Build a coordinator over an empty environment.
#[allow(dead_code)]
pub fn coordinator(
    factory: &Arc<FakeFactory>,
    command: Option<ShutdownCommand>,
    write_lock_timeout: Duration,
) -> RestartCoordinator {
    let mut builder = RestartCoordinator::builder(factory.clone()).write_lock_timeout(write_lock_timeout);
    if let Some(command) = command {
        builder = builder.shutdown_command(command);
    }
    builder.build(&MapEnvironment::new()).unwrap()
}

/// Log lines written while the returned guard is alive, without ANSI colors.
#[allow(dead_code)]
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, Arc<Mutex<Vec<u8>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || LogWriter(writer.clone()))
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}

struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub fn logged(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned()
}
