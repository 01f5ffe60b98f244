//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build environment → Resolve backend → Start instance
//!
//! Request admission (coordinator.rs, lock.rs):
//!     Read hold → current instance → request work → release
//!
//! Restart / stop (trigger.rs → coordinator.rs):
//!     Release caller's read hold → bounded write acquisition
//!     → dispose → optional start → (on stop or failure) process shutdown
//!
//! Process shutdown (shutdown.rs):
//!     ShutdownCommand → broadcast → listeners drain → exit
//!
//! Signals (signals.rs):
//!     SIGHUP → restart
//!     SIGTERM/SIGINT → stop
//! ```
//!
//! # Design Decisions
//! - One reader/writer lock for the coordinator's whole lifetime
//! - Write acquisition is bounded; a stuck request aborts the restart instead of hanging it
//! - Errors inside a restart are logged, never propagated to the caller

pub mod coordinator;
pub mod error;
pub mod lock;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;
pub mod trigger;

pub use coordinator::{CoordinatorBuilder, RestartCoordinator, DEFAULT_WRITE_LOCK_TIMEOUT};
pub use error::{DisposeError, InitializationError, LockError, ServeError};
pub use lock::{ReadHold, RestartLock, ServiceSlot, WriteHold};
pub use shutdown::{Shutdown, ShutdownCommand};
pub use state::ServerState;
pub use trigger::{ShutdownOutcome, ShutdownTrigger};
