use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::answers::{AnswerLayout, AnswerSet};

#[derive(Debug, Serialize)]
pub(crate) struct PaginateResponse {
    pub(crate) source: String,
    pub(crate) sha256: String,
    pub(crate) max_pages: usize,
    pub(crate) chunk_dir: String,
    pub(crate) chunk_count: usize,
    pub(crate) chunks: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExtractAnswersRequest {
    #[validate(length(min = 1, message = "html must not be empty"))]
    pub(crate) html: String,
    #[serde(default)]
    pub(crate) layout: Option<AnswerLayout>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExtractAnswersResponse {
    pub(crate) layout: AnswerLayout,
    pub(crate) answers: AnswerSet,
}

#[derive(Debug, Serialize)]
pub(crate) struct ParsedAnswersResponse {
    pub(crate) filename: String,
    pub(crate) student_name: Option<String>,
    pub(crate) student_id: Option<String>,
    pub(crate) layout: AnswerLayout,
    pub(crate) answers: AnswerSet,
}
