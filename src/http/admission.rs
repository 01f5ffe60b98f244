//! Request admission.
//!
//! # Responsibilities
//! - Scope every note request with a read hold on the restart lock
//! - Run the instance's preprocessors before the handler
//! - Hand the admitted instance to handlers as a request extension
//!
//! # Design Decisions
//! - No live instance means 503, never a wait for the next start
//! - The hold covers the handler and is released on every exit path

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::service::Preprocessed;

/// Middleware admitting a request through the restart coordinator.
pub async fn admission_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let result = state
        .coordinator
        .serve(move |active| async move {
            if let Preprocessed::Reject(status, message) = active.preprocessors.apply(&mut parts) {
                return (status, message).into_response();
            }
            parts.extensions.insert(active);
            next.run(Request::from_parts(parts, body)).await
        })
        .await;

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Request refused, no live service instance");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    };

    metrics::record_request(response.status().as_u16());
    response
}
