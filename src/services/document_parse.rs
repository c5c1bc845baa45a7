use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::core::config::Settings;
use crate::core::metrics;

#[derive(Debug, Clone)]
pub(crate) struct UploadedDocument {
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParsedDocument {
    pub(crate) html: String,
    pub(crate) text: String,
}

/// External document digitization: layout-aware parsing and plain OCR.
#[async_trait]
pub(crate) trait DocumentParser: Send + Sync {
    async fn parse_document(&self, file: UploadedDocument) -> Result<ParsedDocument>;

    async fn ocr_text(&self, file: UploadedDocument) -> Result<String>;
}

#[derive(Debug, Clone)]
pub(crate) struct DocumentParseService {
    client: Client,
    api_key: String,
    url: String,
    max_retries: u32,
}

#[derive(Debug, Clone, Copy)]
enum ParseModel {
    DocumentParse,
    Ocr,
}

impl ParseModel {
    fn as_str(self) -> &'static str {
        match self {
            ParseModel::DocumentParse => "document-parse",
            ParseModel::Ocr => "ocr",
        }
    }

    fn form(self, file: &UploadedDocument) -> Result<Form> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .context("Invalid upload content type")?;

        let form = Form::new().part("document", part).text("model", self.as_str());
        Ok(match self {
            ParseModel::DocumentParse => {
                form.text("ocr", "force").text("base64_encoding", "['table']")
            }
            ParseModel::Ocr => form,
        })
    }
}

impl DocumentParseService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.document_parse().timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(timeout)
            .build()
            .context("Failed to build document parse HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.document_parse().api_key.clone(),
            url: settings.document_parse().url.clone(),
            max_retries: settings.document_parse().max_retries,
        })
    }

    async fn submit(&self, model: ParseModel, file: &UploadedDocument) -> Result<Value> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            let form = model.form(file)?;
            let response =
                self.client.post(&self.url).bearer_auth(&self.api_key).multipart(form).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    metrics::record_upstream("document_parse", status.as_str());
                    let raw_body =
                        resp.text().await.context("Failed to read document parse response")?;

                    let parsed = serde_json::from_str::<Value>(&raw_body).map_err(|err| {
                        anyhow::anyhow!(
                            "Document parse returned non-JSON body (status {}): {}: {}",
                            status,
                            err,
                            raw_body
                        )
                    })?;

                    if status.is_success() {
                        return Ok(parsed);
                    }

                    last_error = Some(anyhow::anyhow!(
                        "Document parse failed (status {}): {}",
                        status,
                        extract_error_message(&parsed)
                    ));

                    // Client errors other than rate limiting will not succeed on retry.
                    if status.is_client_error() && status.as_u16() != 429 {
                        break;
                    }
                }
                Err(err) => {
                    metrics::record_upstream("document_parse", "transport_error");
                    last_error =
                        Some(anyhow::anyhow!(err).context("Failed to call document parse API"));
                }
            }

            if attempt < self.max_retries {
                let backoff = Duration::from_secs(2_u64.pow(attempt));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown document parse error")))
    }
}

#[async_trait]
impl DocumentParser for DocumentParseService {
    async fn parse_document(&self, file: UploadedDocument) -> Result<ParsedDocument> {
        tracing::info!(filename = %file.filename, size = file.bytes.len(), "Parsing document");
        let payload = self.submit(ParseModel::DocumentParse, &file).await?;
        Ok(extract_parsed_document(&payload))
    }

    async fn ocr_text(&self, file: UploadedDocument) -> Result<String> {
        tracing::info!(filename = %file.filename, size = file.bytes.len(), "Running OCR");
        let payload = self.submit(ParseModel::Ocr, &file).await?;
        Ok(payload.get("text").and_then(Value::as_str).unwrap_or_default().trim().to_string())
    }
}

fn extract_parsed_document(payload: &Value) -> ParsedDocument {
    let content = payload.get("content");
    let field = |name: &str| {
        content
            .and_then(|content| content.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    ParsedDocument { html: field("html"), text: field("text") }
}

/// Upstage reports failures as `{"error": {"message", "type", "code"}}`; gateways in front of
/// it sometimes answer with a flat `message` instead.
fn extract_error_message(payload: &Value) -> String {
    let error = payload.get("error");
    error
        .and_then(|error| error.get("message"))
        .or_else(|| payload.get("message"))
        .or(error)
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string()
}
