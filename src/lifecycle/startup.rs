//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the environment from validated configuration
//! - Register the process shutdown command as an environment resource
//! - Construct the coordinator and start the first instance
//!
//! # Design Decisions
//! - Fail fast: a failed first start is returned to the caller
//! - Listeners start last (traffic only when an instance is live)

use std::sync::Arc;
use std::time::Duration;

use crate::config::HostConfig;
use crate::environment::{self, SHUTDOWN_COMMAND};
use crate::lifecycle::coordinator::RestartCoordinator;
use crate::lifecycle::error::InitializationError;
use crate::lifecycle::shutdown::Shutdown;
use crate::service::ServiceFactory;

/// Build a coordinator wired to `shutdown` as its process shutdown command.
pub fn build_coordinator(
    config: &HostConfig,
    factory: Arc<dyn ServiceFactory>,
    shutdown: &Shutdown,
) -> Result<RestartCoordinator, InitializationError> {
    let mut env = environment::from_config(&config.environment);
    env.insert_resource(SHUTDOWN_COMMAND, shutdown.command());

    RestartCoordinator::builder(factory)
        .span(tracing::info_span!("coordinator"))
        .write_lock_timeout(Duration::from_secs(config.restart.write_lock_timeout_secs))
        .build(&env)
}

/// Build the coordinator and start its first instance.
pub async fn boot(
    config: &HostConfig,
    factory: Arc<dyn ServiceFactory>,
    shutdown: &Shutdown,
) -> Result<RestartCoordinator, InitializationError> {
    let coordinator = build_coordinator(config, factory, shutdown)?;
    tracing::info!(
        datasource = ?coordinator.datasource(),
        write_lock_timeout_secs = config.restart.write_lock_timeout_secs,
        "Coordinator constructed"
    );

    coordinator.start_server().await?;
    Ok(coordinator)
}
