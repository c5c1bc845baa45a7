use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use tempfile::TempDir;

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::services::ai_grading::{AnswerGrader, StudentAnswer};
use crate::services::document_parse::{DocumentParser, ParsedDocument, UploadedDocument};

pub(crate) const TEST_UPSTAGE_KEY: &str = "up_test_key_0123456789";
const MULTIPART_BOUNDARY: &str = "exam-grader-test-boundary";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) upload_dir: TempDir,
    _guard: MutexGuard<'static, ()>,
}

/// Serializes tests that touch process environment variables.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn set_test_env() {
    std::env::set_var("GRADER_ENV", "test");
    std::env::set_var("UPSTAGE_API_KEY", TEST_UPSTAGE_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    for key in [
        "ENVIRONMENT",
        "AI_API_KEY",
        "ANSWER_LAYOUT",
        "CHUNK_MAX_PAGES",
        "GRADING_SESSION_TTL_MINUTES",
        "ALLOWED_DOCUMENT_EXTENSIONS",
        "ALLOWED_SUBMISSION_EXTENSIONS",
        "MAX_UPLOAD_SIZE_MB",
        "UPLOAD_DIR",
        "BACKEND_CORS_ORIGINS",
        "API_V1_STR",
        "PROJECT_NAME",
        "GRADER_LOG_JSON",
    ] {
        std::env::remove_var(key);
    }
}

pub(crate) fn setup_test_context(parser: FakeParser, grader: FakeGrader) -> TestContext {
    setup_test_context_with(parser, grader, &[])
}

pub(crate) fn setup_test_context_with(
    parser: FakeParser,
    grader: FakeGrader,
    overrides: &[(&str, &str)],
) -> TestContext {
    let guard = env_lock();
    set_test_env();

    let upload_dir = tempfile::tempdir().expect("upload dir");
    std::env::set_var("UPLOAD_DIR", upload_dir.path());
    for (key, value) in overrides {
        std::env::set_var(key, value);
    }

    let settings = Settings::load().expect("settings");
    let state = AppState::new(settings, Arc::new(parser), Arc::new(grader));
    let app = api::router::router(state.clone());

    TestContext { state, app, upload_dir, _guard: guard }
}

/// Document parser returning canned output.
#[derive(Clone, Default)]
pub(crate) struct FakeParser {
    html: String,
    text: String,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeParser {
    pub(crate) fn new(html: &str, text: &str) -> Self {
        Self { html: html.to_string(), text: text.to_string(), ..Self::default() }
    }

    pub(crate) fn with_html(html: &str) -> Self {
        Self { html: html.to_string(), ..Self::default() }
    }

    pub(crate) fn with_text(text: &str) -> Self {
        Self { text: text.to_string(), ..Self::default() }
    }

    pub(crate) fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("document parser unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentParser for FakeParser {
    async fn parse_document(&self, _file: UploadedDocument) -> Result<ParsedDocument> {
        self.respond()?;
        Ok(ParsedDocument { html: self.html.clone(), text: self.text.clone() })
    }

    async fn ocr_text(&self, _file: UploadedDocument) -> Result<String> {
        self.respond()?;
        Ok(self.text.clone())
    }
}

/// Grader with a fixed short-answer score and canned extracted answers.
#[derive(Clone, Default)]
pub(crate) struct FakeGrader {
    score: f64,
    answers: Vec<StudentAnswer>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeGrader {
    pub(crate) fn with_score(score: f64) -> Self {
        Self { score, ..Self::default() }
    }

    pub(crate) fn with_answers(score: f64, answers: Vec<StudentAnswer>) -> Self {
        Self { score, answers, ..Self::default() }
    }

    pub(crate) fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Number of short-answer scoring calls made so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerGrader for FakeGrader {
    async fn score_short_answer(&self, _student: &str, _expected: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("AI grader unavailable");
        }
        Ok(self.score)
    }

    async fn extract_student_answers(&self, _ocr_text: &str) -> Result<Vec<StudentAnswer>> {
        if self.fail {
            anyhow::bail!("AI grader unavailable");
        }
        Ok(self.answers.clone())
    }
}

pub(crate) fn student_answer(number: u32, answer: &str) -> StudentAnswer {
    StudentAnswer {
        question_number: number,
        question: format!("Question {number}"),
        answer: answer.to_string(),
    }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

/// A file part for [`multipart_request`]: filename, content type and bytes.
pub(crate) type FilePart<'a> = (&'a str, &'a str, &'a [u8]);

pub(crate) fn multipart_request(
    method: Method,
    uri: &str,
    file: Option<FilePart<'_>>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some((filename, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
