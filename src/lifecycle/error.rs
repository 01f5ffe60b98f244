//! Lifecycle error definitions.

use std::time::Duration;
use thiserror::Error;

use crate::environment::LookupError;
use crate::lifecycle::state::ServerState;

/// Errors raised while constructing the coordinator or starting a service instance.
#[derive(Debug, Error)]
pub enum InitializationError {
    /// A required environment entry could not be resolved.
    #[error("environment lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// The selected storage backend is unusable.
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// The service instance refused to start.
    #[error("service failed to start: {0}")]
    Service(String),

    /// The instance started but could not populate an extension point.
    #[error("extension point `{point}` could not be populated: {reason}")]
    Extension { point: String, reason: String },

    /// The restart lock could not be taken for the start.
    #[error("restart lock unavailable: {0}")]
    Lock(#[from] LockError),

    #[error("I/O error during initialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Restart lock errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Release of a read hold the current task does not own.
    #[error("read lock is not held by the current task")]
    NotHeld,

    /// The write side was not granted within the bound.
    #[error("write lock not acquired within {waited:?}")]
    Timeout { waited: Duration },
}

/// Errors raised while a service instance releases its resources.
#[derive(Debug, Error)]
pub enum DisposeError {
    #[error("I/O error during dispose: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error during dispose: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Returned by request admission when there is nothing to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServeError {
    #[error("no service instance is live (state: {state})")]
    Unavailable { state: ServerState },
}
