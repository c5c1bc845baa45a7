use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::services::answers::AnswerLayout;
use crate::services::document_parse::UploadedDocument;
use crate::services::uploads::validate_upload;

pub(crate) fn validate_file(
    file: &UploadedDocument,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    validate_upload(&file.filename, &file.content_type, allowed_extensions)?;
    Ok(())
}

pub(crate) fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::NotFound("Grading session not found".to_string()))
}

/// Page limit from the request, falling back to the configured default.
pub(crate) fn parse_max_pages(raw: Option<&str>, default: usize) -> Result<usize, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    match raw.parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ApiError::BadRequest("max_pages must be a positive integer".to_string())),
    }
}

pub(crate) fn parse_layout(
    raw: Option<&str>,
    default: AnswerLayout,
) -> Result<AnswerLayout, ApiError> {
    match raw {
        Some(raw) => {
            raw.parse::<AnswerLayout>().map_err(|err| ApiError::BadRequest(err.to_string()))
        }
        None => Ok(default),
    }
}
