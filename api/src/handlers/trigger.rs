use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::handlers::{ErrorResponse, MessageResponse};
use crate::state::AppState;
use common::models::{normalize_language, Cadence};

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub since: String,
    pub language: Option<String>,
}

/// Run a digest now for the given period, optionally for one language
///
/// The stored language is left as is.
#[tracing::instrument(skip(state, payload))]
pub async fn trigger_digest(
    State(state): State<AppState>,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ErrorResponse> {
    let Json(req) = payload.map_err(|e| ErrorResponse::bad_request(e.body_text()))?;

    let cadence: Cadence = req
        .since
        .parse()
        .map_err(|_| ErrorResponse::bad_request(format!("Invalid period: {}", req.since)))?;
    let language = normalize_language(req.language.as_deref());

    let label = language.as_deref().unwrap_or("all languages").to_string();
    state.trigger.trigger_with(cadence, language);

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(format!(
            "Executing {} trends for {}",
            cadence, label
        ))),
    ))
}
