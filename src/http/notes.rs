//! Note routes, served by the admitted [`NoteService`] instance.

use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;

use crate::lifecycle::ShutdownOutcome;
use crate::service::notes::NoteService;
use crate::service::ActiveService;

#[derive(Serialize)]
pub struct NoteList {
    pub instance_id: String,
    pub generation: u64,
    pub store: String,
    pub mail_from: Option<String>,
    pub keys: Vec<String>,
}

#[derive(Serialize)]
pub struct Note {
    pub key: String,
    pub value: String,
}

fn note_service(active: &ActiveService) -> Result<&NoteService, Response> {
    active.downcast_ref::<NoteService>().ok_or_else(|| {
        tracing::error!(instance_id = %active.instance.id(), "Live instance is not a note service");
        (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected service type").into_response()
    })
}

pub async fn list_notes(Extension(active): Extension<ActiveService>) -> Response {
    let notes = match note_service(&active) {
        Ok(notes) => notes,
        Err(response) => return response,
    };
    Json(NoteList {
        instance_id: active.instance.id().to_string(),
        generation: active.generation,
        store: notes.store().label(),
        mail_from: notes.mail_from().map(str::to_string),
        keys: notes.keys(),
    })
    .into_response()
}

pub async fn get_note(Extension(active): Extension<ActiveService>, Path(key): Path<String>) -> Response {
    let notes = match note_service(&active) {
        Ok(notes) => notes,
        Err(response) => return response,
    };
    match notes.get(&key) {
        Some(value) => Json(Note { key, value }).into_response(),
        None => (StatusCode::NOT_FOUND, "No such note").into_response(),
    }
}

pub async fn put_note(
    Extension(active): Extension<ActiveService>,
    Path(key): Path<String>,
    body: String,
) -> Response {
    let notes = match note_service(&active) {
        Ok(notes) => notes,
        Err(response) => return response,
    };
    match notes.put(key, body) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::CREATED.into_response(),
    }
}

pub async fn delete_note(Extension(active): Extension<ActiveService>, Path(key): Path<String>) -> Response {
    let notes = match note_service(&active) {
        Ok(notes) => notes,
        Err(response) => return response,
    };
    match notes.remove(&key) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (StatusCode::NOT_FOUND, "No such note").into_response(),
    }
}

/// Restart the service from inside a request.
///
/// The admitted read hold is released by the trigger before it waits for
/// the write side, so this does not wait on itself.
pub async fn reload(Extension(active): Extension<ActiveService>) -> Response {
    let trigger = match note_service(&active) {
        Ok(notes) => match notes.trigger() {
            Some(trigger) => trigger.clone(),
            None => return (StatusCode::CONFLICT, "In-process restart is not available").into_response(),
        },
        Err(response) => return response,
    };

    let outcome = trigger.shutdown(true).await;
    outcome_response(outcome)
}

/// Map a shutdown outcome onto an HTTP response.
pub fn outcome_response(outcome: ShutdownOutcome) -> Response {
    let status = match outcome {
        ShutdownOutcome::Restarted | ShutdownOutcome::Stopped => StatusCode::OK,
        ShutdownOutcome::Aborted => StatusCode::CONFLICT,
        ShutdownOutcome::RestartFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "outcome": outcome.as_str() }))).into_response()
}
