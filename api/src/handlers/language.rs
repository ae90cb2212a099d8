use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use crate::handlers::{ErrorResponse, MessageResponse};
use crate::state::AppState;
use common::models::Cadence;
use common::store::LANGUAGE_KEY;

#[derive(Debug, Deserialize)]
pub struct SetLanguageRequest {
    pub language: Option<String>,
}

/// Switch the language filter and kick off a daily digest with it
///
/// Anything that does not carry a non-blank `language` string is rejected
/// without touching the configuration file. Surrounding whitespace is
/// trimmed before the value is stored, and the reply echoes the trimmed
/// value (`" rust "` is stored and reported as `rust`).
#[tracing::instrument(skip(state, payload))]
pub async fn set_language(
    State(state): State<AppState>,
    payload: Result<Json<SetLanguageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ErrorResponse> {
    let language = payload
        .ok()
        .and_then(|Json(req)| req.language)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ErrorResponse::bad_request("No language provided"))?;

    state
        .store
        .update(LANGUAGE_KEY, &language)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to update language");
            ErrorResponse::internal(e.to_string())
        })?;

    tracing::info!(language = %language, "Language updated, triggering daily digest");
    state.trigger.trigger(Cadence::Daily);

    Ok(Json(MessageResponse::new(format!(
        "Language updated: {}",
        language
    ))))
}
