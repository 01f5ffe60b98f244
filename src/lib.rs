//! Graceful service-restart coordinator.
//!
//! Stops, restarts, or tears down a request-serving component without
//! corrupting in-flight work and without exiting the hosting process.

pub mod admin;
pub mod config;
pub mod environment;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod service;

pub use config::HostConfig;
pub use environment::{BackendContext, EnvironmentLookup, MapEnvironment};
pub use http::HostServer;
pub use lifecycle::{RestartCoordinator, RestartLock, Shutdown, ShutdownOutcome, ShutdownTrigger};
pub use service::{Service, ServiceFactory};
