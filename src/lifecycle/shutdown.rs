//! Process-level shutdown.

use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinator for graceful process shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// A command that triggers this shutdown when run.
    pub fn command(&self) -> ShutdownCommand {
        let tx = self.tx.clone();
        ShutdownCommand::new(move || {
            let _ = tx.send(());
        })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero-argument callable that terminates the hosting process.
#[derive(Clone)]
pub struct ShutdownCommand(Arc<dyn Fn() + Send + Sync>);

impl ShutdownCommand {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn run(&self) {
        (self.0)()
    }
}

impl fmt::Debug for ShutdownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShutdownCommand")
    }
}
