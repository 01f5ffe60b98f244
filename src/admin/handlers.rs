use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use crate::http::notes::outcome_response;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub state: &'static str,
    pub generation: u64,
    pub instance_id: Option<String>,
    pub datasource: Option<String>,
    pub preprocessors: Vec<String>,
    pub in_process_restart: bool,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let coordinator = &state.coordinator;
    let hold = coordinator.restart_lock().read().await;

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        state: coordinator.state().as_str(),
        generation: hold.generation(),
        instance_id: hold.instance().map(|s| s.id().to_string()),
        datasource: coordinator.datasource().map(str::to_string),
        preprocessors: hold.preprocessors().names(),
        in_process_restart: coordinator.has_shutdown_command(),
    })
}

pub async fn start(State(state): State<AppState>) -> Response {
    match state.coordinator.start_server().await {
        Ok(service) => Json(serde_json::json!({
            "instance_id": service.id().to_string(),
        }))
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn restart(State(state): State<AppState>) -> Response {
    let outcome = state.coordinator.trigger().shutdown(true).await;
    outcome_response(outcome)
}

pub async fn stop(State(state): State<AppState>) -> Response {
    let outcome = state.coordinator.trigger().shutdown(false).await;
    outcome_response(outcome)
}
