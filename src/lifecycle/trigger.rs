//! Shutdown trigger handed to services and the hosting environment.

use std::fmt;
use std::sync::Weak;

use crate::lifecycle::coordinator::Inner;

/// What a `shutdown` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The old instance was disposed and a new one is live.
    Restarted,
    /// The instance was disposed and nothing replaced it.
    Stopped,
    /// A restart was requested, but the new instance failed to start; the
    /// coordinator fell back to a full stop.
    RestartFailed,
    /// The write lock was not granted in time; the running instance was left untouched.
    Aborted,
}

impl ShutdownOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownOutcome::Restarted => "restarted",
            ShutdownOutcome::Stopped => "stopped",
            ShutdownOutcome::RestartFailed => "restart_failed",
            ShutdownOutcome::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability to stop or restart the current service instance.
///
/// Cheap to clone and safe to call from any task. Holds the coordinator
/// weakly so a service keeping its trigger does not keep the coordinator alive.
#[derive(Clone)]
pub struct ShutdownTrigger {
    pub(crate) inner: Weak<Inner>,
}

impl ShutdownTrigger {
    /// Stop the current instance, then start a new one if `restart` is set.
    ///
    /// Never fails; every error is logged and folded into the outcome.
    pub async fn shutdown(&self, restart: bool) -> ShutdownOutcome {
        match self.inner.upgrade() {
            Some(inner) => Inner::shutdown(&inner, restart).await,
            None => {
                tracing::warn!(restart, "Shutdown requested after the coordinator was dropped");
                ShutdownOutcome::Aborted
            }
        }
    }
}

impl fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownTrigger")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}
