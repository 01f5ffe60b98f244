//! Coordinator lifecycle state.
//!
//! # States
//! - Stopped: no service instance is installed
//! - Starting: initial boot is constructing an instance
//! - Running: an instance is installed and serving
//! - Disposing: the write lock is held and the old instance is being released
//! - Restarting: the write lock is held and a replacement is being constructed
//!
//! # State Transitions
//! ```text
//! Stopped    → Starting  : start_server()
//! Starting   → Running   : instance started
//! Starting   → Stopped   : start failed
//! Running    → Disposing : shutdown(_) acquired the write lock
//! Disposing  → Restarting: shutdown(true)
//! Disposing  → Stopped   : shutdown(false)
//! Restarting → Running   : replacement started
//! Restarting → Stopped   : replacement failed
//! ```

use std::fmt;

/// Coordinator state, stored as a `u8` so it can be read without the restart lock.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Restarting = 3,
    Disposing = 4,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Restarting => "restarting",
            ServerState::Disposing => "disposing",
        }
    }
}

impl From<u8> for ServerState {
    fn from(val: u8) -> Self {
        match val {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Restarting,
            4 => ServerState::Disposing,
            _ => ServerState::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
