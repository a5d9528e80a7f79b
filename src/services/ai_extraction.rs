use std::time::{Duration, Instant};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;
use crate::services::question_import::{self, ImportError, StagedQuestion};

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract multiple-choice questions from medical exam \
papers. Return every question found in the document. Each question has a subject (for example \
Anatomy, Physiology, Pharmacology), a topic within that subject, the question text, exactly four \
options in the order printed, the zero-based index of the correct option and a short explanation \
when the document provides one. Keep formulas and markup as printed. Do not invent questions.";

#[derive(Debug, Error)]
pub(crate) enum ExtractionError {
    #[error("AI extraction is not configured")]
    NotConfigured,
    #[error("AI request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("AI service returned {status}")]
    Upstream { status: u16, body: String },
    #[error("AI response has no content")]
    MissingContent,
    #[error("AI response is not valid question JSON: {0}")]
    Malformed(String),
    #[error("AI response failed validation: {0}")]
    Invalid(#[from] ImportError),
}

#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    questions: Vec<StagedQuestion>,
}

#[derive(Debug, Clone)]
pub(crate) struct AiExtractionService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    max_questions: usize,
}

impl AiExtractionService {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
            max_questions: settings.import().max_questions_per_batch,
        })
    }

    pub(crate) fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.base_url.is_empty()
    }

    /// Sends the PDF once and returns the validated candidates. Nothing is persisted.
    pub(crate) async fn extract_questions(
        &self,
        filename: &str,
        pdf: &[u8],
    ) -> Result<Vec<StagedQuestion>, ExtractionError> {
        if !self.is_configured() {
            return Err(ExtractionError::NotConfigured);
        }

        let timer = Instant::now();
        let payload = self.request_payload(filename, pdf);
        let url = format!("{}/chat/completions", self.base_url);

        tracing::info!(filename, bytes = pdf.len(), model = %self.model, "Sending AI extraction request");

        let response = self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                metrics::counter!("ai_extraction_total", "outcome" => "transport_error").increment(1);
                return Err(err.into());
            }
        };

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            metrics::counter!("ai_extraction_total", "outcome" => "upstream_error").increment(1);
            return Err(ExtractionError::Upstream { status: status.as_u16(), body: body.to_string() });
        }

        let staged = parse_completion(&body, self.max_questions);
        let outcome = if staged.is_ok() { "ok" } else { "invalid" };
        metrics::counter!("ai_extraction_total", "outcome" => outcome).increment(1);
        metrics::histogram!("ai_extraction_seconds").record(timer.elapsed().as_secs_f64());

        if let Ok(items) = &staged {
            tracing::info!(
                filename,
                extracted = items.len(),
                elapsed_ms = timer.elapsed().as_millis() as u64,
                "AI extraction finished"
            );
        }
        staged
    }

    fn request_payload(&self, filename: &str, pdf: &[u8]) -> Value {
        let file_data = format!("data:application/pdf;base64,{}", STANDARD.encode(pdf));

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": EXTRACTION_SYSTEM_PROMPT},
                {"role": "user", "content": [
                    {"type": "text", "text": "Extract all multiple-choice questions from this document."},
                    {"type": "file", "file": {"filename": filename, "file_data": file_data}}
                ]}
            ],
            "max_completion_tokens": self.max_tokens,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "question_batch", "strict": true, "schema": question_schema()}
            }
        })
    }
}

fn question_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["questions"],
        "properties": {
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["subject", "topic", "text", "options", "correct_index", "explanation"],
                    "properties": {
                        "subject": {"type": "string"},
                        "topic": {"type": "string"},
                        "text": {"type": "string"},
                        "options": {"type": "array", "items": {"type": "string"}, "minItems": 4, "maxItems": 4},
                        "correct_index": {"type": "integer", "minimum": 0, "maximum": 3},
                        "explanation": {"type": ["string", "null"]}
                    }
                }
            }
        }
    })
}

pub(crate) fn parse_completion(
    body: &Value,
    max_questions: usize,
) -> Result<Vec<StagedQuestion>, ExtractionError> {
    let content = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or(ExtractionError::MissingContent)?;

    let payload: ExtractionPayload =
        serde_json::from_str(content).map_err(|err| ExtractionError::Malformed(err.to_string()))?;

    question_import::validate_batch(&payload.questions, max_questions)?;
    Ok(payload.questions)
}
