use serde::Serialize;
use uuid::Uuid;

use crate::core::time::format_offset;
use crate::services::answer_key::AnswerKeyEntry;
use crate::services::grading_sessions::GradingSession;
use crate::services::scoring::{GradeReport, QuestionResult};

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeySummary {
    pub(crate) source_path: String,
    pub(crate) question_count: usize,
    pub(crate) entries: Vec<AnswerKeyEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradingSessionResponse {
    pub(crate) id: Uuid,
    pub(crate) created_at: String,
    pub(crate) answer_key: Option<AnswerKeySummary>,
}

impl From<GradingSession> for GradingSessionResponse {
    fn from(session: GradingSession) -> Self {
        Self {
            id: session.id,
            created_at: format_offset(session.created_at),
            answer_key: session.answer_key.map(|stored| AnswerKeySummary {
                source_path: stored.source_path.display().to_string(),
                question_count: stored.key.len(),
                entries: stored.key.entries,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionGradeResponse {
    pub(crate) session_id: Uuid,
    pub(crate) filename: String,
    pub(crate) sha256: String,
    pub(crate) results: Vec<QuestionResult>,
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
}

impl SubmissionGradeResponse {
    pub(crate) fn new(
        session_id: Uuid,
        filename: String,
        sha256: String,
        report: GradeReport,
    ) -> Self {
        Self {
            session_id,
            filename,
            sha256,
            results: report.results,
            total_score: report.total_score,
            max_score: report.max_score,
        }
    }
}
