//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals into shutdown trigger calls
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP restarts the service instance in place, the process keeps running
//! - SIGTERM/SIGINT stop the instance, which runs the process shutdown command

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::lifecycle::trigger::ShutdownTrigger;

/// Spawn a task that forwards OS signals to `trigger` until `shutdown` fires.
pub fn spawn_signal_handler(trigger: ShutdownTrigger, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let (mut hangup, mut terminate) = match (signal(SignalKind::hangup()), signal(SignalKind::terminate())) {
                (Ok(hangup), Ok(terminate)) => (hangup, terminate),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = hangup.recv() => {
                        tracing::info!("SIGHUP received, restarting server");
                        let outcome = trigger.shutdown(true).await;
                        tracing::info!(%outcome, "Restart finished");
                    }
                    _ = terminate.recv() => {
                        tracing::info!("SIGTERM received, stopping server");
                        trigger.shutdown(false).await;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("SIGINT received, stopping server");
                        trigger.shutdown(false).await;
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Signal handler exiting");
                        break;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, stopping server");
                    trigger.shutdown(false).await;
                }
                _ = shutdown.recv() => {}
            }
        }
    })
}
