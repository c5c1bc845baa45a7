use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::upload_form::UploadForm;
use crate::api::validation::{parse_layout, parse_max_pages, validate_file};
use crate::core::state::AppState;
use crate::schemas::document::{PaginateResponse, ParsedAnswersResponse};
use crate::services::answers::{extract_answers, extract_student_header};
use crate::services::paginator;
use crate::services::uploads::UploadCategory;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/paginate", post(paginate_document))
        .route("/parse-answers", post(parse_answers))
}

async fn paginate_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PaginateResponse>, ApiError> {
    let storage = state.settings().storage();
    let mut form = UploadForm::read(&mut multipart, storage.max_upload_size_mb).await?;
    let max_pages =
        parse_max_pages(form.field("max_pages"), state.settings().grading().chunk_max_pages)?;
    let file = form.take_file()?;
    validate_file(&file, &storage.allowed_document_extensions)?;

    let stored =
        state.uploads().store(UploadCategory::Lectures, &file.filename, &file.bytes).await?;

    let source = stored.path.clone();
    let chunk_count =
        tokio::task::spawn_blocking(move || paginator::paginate(&source, max_pages))
            .await
            .map_err(|err| ApiError::internal(err, "Pagination task failed"))??;

    let chunk_dir = paginator::chunk_dir_for(&stored.path);
    let chunks = (1..=chunk_count)
        .map(|index| paginator::chunk_path(&chunk_dir, index).display().to_string())
        .collect();

    tracing::info!(
        filename = %file.filename,
        chunk_count,
        max_pages,
        "Document paginated for upload"
    );

    Ok(Json(PaginateResponse {
        source: stored.path.display().to_string(),
        sha256: stored.sha256,
        max_pages,
        chunk_dir: chunk_dir.display().to_string(),
        chunk_count,
        chunks,
    }))
}

async fn parse_answers(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ParsedAnswersResponse>, ApiError> {
    let storage = state.settings().storage();
    let mut form = UploadForm::read(&mut multipart, storage.max_upload_size_mb).await?;
    let layout = parse_layout(form.field("layout"), state.settings().grading().answer_layout)?;
    let file = form.take_file()?;
    validate_file(&file, &storage.allowed_submission_extensions)?;

    state.uploads().store(UploadCategory::Exams, &file.filename, &file.bytes).await?;

    let filename = file.filename.clone();
    let parsed = state
        .parser()
        .parse_document(file)
        .await
        .map_err(|err| ApiError::upstream(&err, "Document parsing failed"))?;

    let (layout, answers) = extract_answers(&parsed.html, layout)?;
    let header = extract_student_header(&parsed.html);

    Ok(Json(ParsedAnswersResponse {
        filename,
        student_name: header.as_ref().map(|header| header.name.clone()),
        student_id: header.map(|header| header.id),
        layout,
        answers,
    }))
}
