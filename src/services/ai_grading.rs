use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::core::config::Settings;
use crate::core::metrics;
use crate::services::scoring::parse_score_reply;

const MAX_RETRIES: u32 = 3;

const EXTRACTION_PROMPT: &str = "You are an expert exam parser.
Extract all questions and the student's answers from the following exam OCR text.
Return a JSON array of objects with the keys: question_number, question, answer.
For multiple choice questions the answer must be only the option letter. \
For other questions return the full student response.";

const SCORING_PROMPT: &str = "You are an exam grading assistant.
The student's answer may contain spacing or formatting errors caused by OCR or parsing. \
Judge the actual meaning: if the answer is correct but formatted wrong (like '1 2' instead of '12'), \
treat it as correct.
Given the student's answer and the correct answer, rate how accurate the student's answer is.
Only return a number from 0 to 100 (no % sign).";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StudentAnswer {
    pub(crate) question_number: u32,
    pub(crate) question: String,
    pub(crate) answer: String,
}

/// Model-backed operations needed to grade a submission.
#[async_trait]
pub(crate) trait AnswerGrader: Send + Sync {
    /// Similarity of a free-text answer to the expected one, in `[0, 1]`.
    async fn score_short_answer(&self, student: &str, expected: &str) -> Result<f64>;

    async fn extract_student_answers(&self, ocr_text: &str) -> Result<Vec<StudentAnswer>>;
}

#[derive(Debug, Clone)]
pub(crate) struct AiGradingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AiGradingService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().api_key.clone(),
            base_url: settings.ai().base_url.trim_end_matches('/').to_string(),
            model: settings.ai().model.clone(),
            max_tokens: settings.ai().max_tokens,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_tokens,
            "stream": false
        });

        let url = format!("{}/chat/completions", self.base_url);
        let timer = Instant::now();
        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..=MAX_RETRIES {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    metrics::record_upstream("ai", status.as_str());
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow::anyhow!("AI API error (status {status}): {body}"));
                }
                Err(err) => {
                    metrics::record_upstream("ai", "transport_error");
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call AI API"));
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .context("Missing AI response content")?;

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(Value::as_u64);
        tracing::debug!(
            model = %self.model,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used,
            "AI completion received"
        );

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl AnswerGrader for AiGradingService {
    async fn score_short_answer(&self, student: &str, expected: &str) -> Result<f64> {
        let prompt = format!(
            "{SCORING_PROMPT}\n\nCorrect Answer: {expected}\nStudent Answer: {student}\n\nScore (0-100):"
        );
        let reply = self.complete(prompt).await?;
        Ok(parse_score_reply(&reply))
    }

    async fn extract_student_answers(&self, ocr_text: &str) -> Result<Vec<StudentAnswer>> {
        let prompt = format!("{EXTRACTION_PROMPT}\nContext:\n{ocr_text}\n\nExtracted JSON:");
        let reply = self.complete(prompt).await?;
        let answers = parse_student_answers(&reply);

        if answers.is_empty() {
            tracing::warn!("AI answer extraction returned no usable answers");
        } else {
            tracing::info!(answers = answers.len(), "AI answer extraction completed");
        }

        Ok(answers)
    }
}

/// Parses the model's JSON reply, tolerating a fenced code block around it.
///
/// Anything that is not a JSON array gives an empty list. Items without a usable
/// question number are numbered by their position.
pub(crate) fn parse_student_answers(reply: &str) -> Vec<StudentAnswer> {
    let mut content = reply.trim();
    if let Some(rest) = content.strip_prefix("```json") {
        content = rest.trim();
    }
    if let Some(rest) = content.strip_suffix("```") {
        content = rest.trim();
    }

    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_object())
        .map(|(position, item)| StudentAnswer {
            question_number: question_number(item.get("question_number"))
                .unwrap_or(position as u32 + 1),
            question: text_field(item.get("question")),
            answer: text_field(item.get("answer")),
        })
        .collect()
}

fn question_number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
