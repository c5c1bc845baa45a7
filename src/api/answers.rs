use axum::{extract::State, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::document::{ExtractAnswersRequest, ExtractAnswersResponse};
use crate::services::answers::extract_answers;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/extract", post(extract))
}

async fn extract(
    State(state): State<AppState>,
    Json(payload): Json<ExtractAnswersRequest>,
) -> Result<Json<ExtractAnswersResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let requested = payload.layout.unwrap_or(state.settings().grading().answer_layout);
    let (layout, answers) = extract_answers(&payload.html, requested)?;

    Ok(Json(ExtractAnswersResponse { layout, answers }))
}
