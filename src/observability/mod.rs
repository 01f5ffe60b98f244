//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinator, services, and HTTP host produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Every instance logs under its own span (instance id, generation)
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
