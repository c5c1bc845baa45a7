use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::upload_form::UploadForm;
use crate::api::validation::{parse_session_id, validate_file};
use crate::core::state::AppState;
use crate::schemas::grading::{GradingSessionResponse, SubmissionGradeResponse};
use crate::services::answer_key::AnswerKey;
use crate::services::grading_sessions::{GradingSession, StoredAnswerKey};
use crate::services::scoring::grade_exam;
use crate::services::uploads::UploadCategory;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
        .route("/sessions/:session_id/answer-key", put(upload_answer_key))
        .route("/sessions/:session_id/submissions", post(grade_submission))
}

async fn fetch_session(state: &AppState, raw_id: &str) -> Result<GradingSession, ApiError> {
    let id = parse_session_id(raw_id)?;
    state
        .sessions()
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound("Grading session not found".to_string()))
}

async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<GradingSessionResponse>) {
    let session = state.sessions().create().await;
    tracing::info!(session_id = %session.id, "Grading session started");
    (StatusCode::CREATED, Json(session.into()))
}

async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GradingSessionResponse>, ApiError> {
    let session = fetch_session(&state, &session_id).await?;
    Ok(Json(session.into()))
}

async fn delete_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&session_id)?;
    if !state.sessions().remove(id).await {
        return Err(ApiError::NotFound("Grading session not found".to_string()));
    }

    tracing::info!(session_id = %id, "Grading session deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_answer_key(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GradingSessionResponse>, ApiError> {
    let session = fetch_session(&state, &session_id).await?;

    let storage = state.settings().storage();
    let mut form = UploadForm::read(&mut multipart, storage.max_upload_size_mb).await?;
    let file = form.take_file()?;
    validate_file(&file, &storage.allowed_document_extensions)?;

    let stored =
        state.uploads().store(UploadCategory::AnswerKeys, &file.filename, &file.bytes).await?;
    let parsed = state
        .parser()
        .parse_document(file)
        .await
        .map_err(|err| ApiError::upstream(&err, "Answer key parsing failed"))?;

    let key = AnswerKey::from_html(&parsed.html);
    if key.is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "No answers found in the answer key table".to_string(),
        ));
    }

    let question_count = key.len();
    let updated = state
        .sessions()
        .set_answer_key(session.id, StoredAnswerKey { source_path: stored.path, key })
        .await
        .ok_or_else(|| ApiError::NotFound("Grading session not found".to_string()))?;

    tracing::info!(session_id = %session.id, question_count, "Answer key attached");
    Ok(Json(updated.into()))
}

async fn grade_submission(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmissionGradeResponse>, ApiError> {
    let session = fetch_session(&state, &session_id).await?;
    let answer_key = session.answer_key.ok_or_else(|| {
        ApiError::Conflict("Upload an answer key before grading submissions".to_string())
    })?;

    let storage = state.settings().storage();
    let mut form = UploadForm::read(&mut multipart, storage.max_upload_size_mb).await?;
    let file = form.take_file()?;
    validate_file(&file, &storage.allowed_submission_extensions)?;

    let stored =
        state.uploads().store(UploadCategory::Submissions, &file.filename, &file.bytes).await?;
    let filename = file.filename.clone();

    let ocr_text = state
        .parser()
        .ocr_text(file)
        .await
        .map_err(|err| ApiError::upstream(&err, "Submission OCR failed"))?;
    if ocr_text.is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "No text could be recognized in the submission".to_string(),
        ));
    }

    let student_answers = state
        .grader()
        .extract_student_answers(&ocr_text)
        .await
        .map_err(|err| ApiError::upstream(&err, "Answer extraction failed"))?;
    if student_answers.is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "No answers could be extracted from the submission".to_string(),
        ));
    }

    let report = grade_exam(&student_answers, &answer_key.key, state.grader())
        .await
        .map_err(|err| ApiError::upstream(&err, "Short answer scoring failed"))?;

    tracing::info!(
        session_id = %session.id,
        filename = %filename,
        questions = report.results.len(),
        total_score = report.total_score,
        "Submission graded"
    );

    Ok(Json(SubmissionGradeResponse::new(session.id, filename, stored.sha256, report)))
}
