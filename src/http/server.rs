//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with note and admin handlers
//! - Wrap note routes in request admission
//! - Wire up tracing middleware
//! - Serve until the process shutdown broadcast fires

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::config::HostConfig;
use crate::http::admission::admission_middleware;
use crate::http::notes::{delete_note, get_note, list_notes, put_note, reload};
use crate::lifecycle::RestartCoordinator;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: RestartCoordinator,
    pub config: Arc<HostConfig>,
}

/// HTTP server hosting the coordinated service.
pub struct HostServer {
    router: Router,
}

impl HostServer {
    /// Create a new HTTP server for `coordinator`.
    pub fn new(config: HostConfig, coordinator: RestartCoordinator) -> Self {
        let state = AppState {
            coordinator,
            config: Arc::new(config),
        };

        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let notes = Router::new()
            .route("/notes", get(list_notes))
            .route("/notes/{key}", get(get_note).put(put_note).delete(delete_note))
            .route("/reload", post(reload))
            .route_layer(middleware::from_fn_with_state(state.clone(), admission_middleware))
            .with_state(state.clone());

        Router::new()
            .merge(notes)
            .merge(setup_admin_router(state))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
