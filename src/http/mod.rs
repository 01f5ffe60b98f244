//! HTTP hosting subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routing, graceful shutdown)
//!     → admission.rs (read hold on the restart lock, preprocessors)
//!     → notes.rs (handlers against the admitted instance)
//!     → Send to client
//!
//! Admin routes (admin/) bypass admission so they work while stopped.
//! ```

pub mod admission;
pub mod notes;
pub mod server;

pub use server::{AppState, HostServer};
