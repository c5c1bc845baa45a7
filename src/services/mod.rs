pub(crate) mod ai_grading;
pub(crate) mod answer_key;
pub(crate) mod answers;
pub(crate) mod document_parse;
pub(crate) mod grading_sessions;
pub(crate) mod paginator;
pub(crate) mod scoring;
pub(crate) mod uploads;
