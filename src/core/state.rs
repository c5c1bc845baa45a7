use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::ai_grading::AnswerGrader;
use crate::services::document_parse::DocumentParser;
use crate::services::grading_sessions::GradingSessions;
use crate::services::uploads::UploadStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    uploads: UploadStore,
    sessions: GradingSessions,
    parser: Arc<dyn DocumentParser>,
    grader: Arc<dyn AnswerGrader>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        parser: Arc<dyn DocumentParser>,
        grader: Arc<dyn AnswerGrader>,
    ) -> Self {
        let uploads = UploadStore::from_settings(&settings);
        let ttl_minutes = i64::try_from(settings.grading().session_ttl_minutes)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 60);
        let sessions = GradingSessions::new(time::Duration::minutes(ttl_minutes));

        Self { inner: Arc::new(InnerState { settings, uploads, sessions, parser, grader }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn uploads(&self) -> &UploadStore {
        &self.inner.uploads
    }

    pub(crate) fn sessions(&self) -> &GradingSessions {
        &self.inner.sessions
    }

    pub(crate) fn parser(&self) -> &dyn DocumentParser {
        self.inner.parser.as_ref()
    }

    pub(crate) fn grader(&self) -> &dyn AnswerGrader {
        self.inner.grader.as_ref()
    }
}
