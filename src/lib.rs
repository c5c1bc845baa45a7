pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::ai_grading::AiGradingService;
use crate::services::document_parse::DocumentParseService;

pub use crate::services::answers::{
    extract_answers, extract_student_header, AnswerLayout, AnswerSet, ExtractError,
    StudentHeader, UnknownLayout,
};
pub use crate::services::paginator::{
    chunk_dir_for, chunk_path, paginate, plan_chunks, ChunkPlan, PaginatorError,
};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let parser = DocumentParseService::from_settings(&settings)?;
    let grader = AiGradingService::from_settings(&settings)?;
    let state = AppState::new(settings, Arc::new(parser), Arc::new(grader));

    let upload_root = state.uploads().root().display().to_string();
    state
        .uploads()
        .health()
        .await
        .with_context(|| format!("Upload directory {upload_root} is not usable"))?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        upload_dir = %upload_root,
        "Exam grader API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Exam grader API stopped");
    Ok(())
}
