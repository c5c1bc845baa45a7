use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::answers::ExtractError;
use crate::services::paginator::PaginatorError;
use crate::services::uploads::UploadError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    /// Log a failed call to an external service and return a `BadGateway` variant.
    pub(crate) fn upstream(err: &anyhow::Error, context: &str) -> Self {
        tracing::error!(error = %format!("{err:#}"), "{context}");
        Self::BadGateway(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::UnprocessableEntity(message)
            | ApiError::BadGateway(message) => message,
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::Io(err) => ApiError::internal(err, "Failed to store upload"),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(error: ExtractError) -> Self {
        ApiError::UnprocessableEntity(error.to_string())
    }
}

impl From<PaginatorError> for ApiError {
    fn from(error: PaginatorError) -> Self {
        match error {
            PaginatorError::InvalidPageLimit => ApiError::BadRequest(error.to_string()),
            PaginatorError::DocumentRead { .. } => {
                tracing::warn!(error = %error, "Uploaded document could not be read");
                ApiError::UnprocessableEntity("Uploaded file is not a readable PDF".to_string())
            }
            PaginatorError::Io(_) | PaginatorError::Serialize { .. } => {
                ApiError::internal(error, "Failed to write document chunks")
            }
        }
    }
}
