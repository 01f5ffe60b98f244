//! Restart host.
//!
//! Runs the note service behind the restart coordinator.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request       ┌────────────────────────────────────────────────┐
//!     ─────────────────────┼─▶ http server ─▶ admission ─▶ note handlers    │
//!                          │                  (read hold)      │            │
//!                          │                                   ▼            │
//!                          │                          ┌─────────────────┐   │
//!     SIGHUP / SIGTERM ────┼─▶ signals ──┐            │  NoteService    │   │
//!     POST /admin/* ───────┼─▶ admin ────┼─▶ trigger ─▶  (slot in the   │   │
//!     POST /reload ────────┼─────────────┘ (write hold)   restart lock)  │   │
//!                          │                          └─────────────────┘   │
//!                          │   stop / failed restart ─▶ process shutdown    │
//!                          └────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use restart_coordinator::config::{load_config, HostConfig};
use restart_coordinator::http::HostServer;
use restart_coordinator::lifecycle::{signals, startup, Shutdown};
use restart_coordinator::observability::{logging, metrics};
use restart_coordinator::service::notes::NoteServiceFactory;

#[derive(Parser)]
#[command(name = "restart-host")]
#[command(about = "Serve the note service behind the restart coordinator", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HostConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("restart-host v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.server.bind_address,
        write_lock_timeout_secs = config.restart.write_lock_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let coordinator = startup::boot(&config, Arc::new(NoteServiceFactory), &shutdown).await?;

    let signal_task = signals::spawn_signal_handler(coordinator.trigger(), shutdown.subscribe());

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let server_shutdown = shutdown.subscribe();
    HostServer::new(config, coordinator.clone()).run(listener, server_shutdown).await?;

    // The listener can also stop on its own; make sure the instance is released.
    if coordinator.server().await.is_some() {
        coordinator.stop_server().await;
    }
    signal_task.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
