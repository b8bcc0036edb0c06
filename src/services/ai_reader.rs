use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::metrics;
use crate::db::models::AnswerMap;
use crate::services::scoring::normalize_answers;
use crate::services::sheet_codes::normalize_sheet_code;

const READER_SYSTEM_PROMPT: &str = "You are an expert system for automatically reading exam answer sheets. \
Analyse the image and reply with pure JSON only.";

#[derive(Debug, Clone)]
pub(crate) struct SheetReadRequest {
    pub(crate) image_base64: String,
    pub(crate) num_questions: i32,
    pub(crate) option_letters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AiSheetReply {
    pub(crate) sheet_code: String,
    pub(crate) answers: AnswerMap,
}

#[derive(Debug, Error)]
pub(crate) enum AiReadError {
    #[error("AI service request failed: {0}")]
    Service(String),
    #[error("Failed to interpret the AI response")]
    NotJson { raw: String },
    #[error("AI response does not match the expected format: {reason}")]
    InvalidShape { reason: String, raw: String },
}

impl AiReadError {
    pub(crate) fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Service(_) => None,
            Self::NotJson { raw } | Self::InvalidShape { raw, .. } => Some(raw),
        }
    }
}

/// Reads the sheet code and marked answers off a sheet image.
#[async_trait]
pub(crate) trait AnswerSheetReader: Send + Sync {
    async fn read_sheet(&self, request: &SheetReadRequest) -> Result<AiSheetReply, AiReadError>;
}

#[derive(Debug, Clone)]
pub(crate) struct OpenAiSheetReader {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiSheetReader {
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
        })
    }

    async fn request_content(&self, request: &SheetReadRequest) -> Result<String, AiReadError> {
        let payload = json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "temperature": 0,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": READER_SYSTEM_PROMPT},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": user_prompt(request)},
                        {
                            "type": "image_url",
                            "image_url": {"url": format!("data:image/jpeg;base64,{}", request.image_base64)}
                        }
                    ]
                }
            ]
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| AiReadError::Service(err.to_string()))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(AiReadError::Service(format!("OpenAI API returned {status}: {body}")));
        }

        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AiReadError::Service("Missing OpenAI response content".to_string()))
    }
}

#[async_trait]
impl AnswerSheetReader for OpenAiSheetReader {
    async fn read_sheet(&self, request: &SheetReadRequest) -> Result<AiSheetReply, AiReadError> {
        let timer = Instant::now();
        tracing::info!(model = %self.model, "Sending AI sheet reading request");

        let content = self.request_content(request).await;
        metrics::record_ai_read_duration(timer.elapsed());

        let content = content?;
        tracing::info!(
            duration_ms = timer.elapsed().as_millis() as u64,
            "AI sheet reading completed"
        );

        parse_reply(&content, request.num_questions, &request.option_letters)
    }
}

fn user_prompt(request: &SheetReadRequest) -> String {
    format!(
        "Analyse the image of an exam answer sheet with {} questions and identify which \
option ({}) is marked for each question. If a question is blank, use ''. The sheet code is \
printed after the label CODE at the top of the page. Reply exactly in this format:\n\n\
{{ \"sheet_code\": \"CODE\", \"answers\": {{ \"1\": \"A\", \"2\": \"B\", ... }} }}",
        request.num_questions,
        request.option_letters.join(", "),
    )
}

/// Validates a model reply against the exam before anything is stored.
pub(crate) fn parse_reply(
    raw: &str,
    num_questions: i32,
    letters: &[String],
) -> Result<AiSheetReply, AiReadError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|_| AiReadError::NotJson { raw: raw.to_string() })?;

    let invalid = |reason: String| AiReadError::InvalidShape { reason, raw: raw.to_string() };

    let object = value.as_object().ok_or_else(|| invalid("expected a JSON object".to_string()))?;

    let sheet_code = object
        .get("sheet_code")
        .and_then(Value::as_str)
        .and_then(normalize_sheet_code)
        .ok_or_else(|| invalid("'sheet_code' must be a non-empty string".to_string()))?;

    let mut entries = Vec::new();
    match object.get("answers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(answers)) => {
            for (question, answer) in answers {
                let letter = match answer {
                    Value::String(letter) => letter.clone(),
                    Value::Null => String::new(),
                    other => {
                        return Err(invalid(format!(
                            "answer for question {question} must be a string, got {other}"
                        )))
                    }
                };
                entries.push((question.clone(), letter));
            }
        }
        Some(_) => return Err(invalid("'answers' must be an object".to_string())),
    }

    let answers = normalize_answers(entries, num_questions, letters)
        .map_err(|err| invalid(err.to_string()))?;

    Ok(AiSheetReply { sheet_code, answers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::option_letters;

    fn letters() -> Vec<String> {
        option_letters(5)
    }

    #[test]
    fn parses_valid_reply() {
        let reply = parse_reply(
            r#"{"sheet_code": "a1b2c", "answers": {"1": "a", "2": "", "3": null, "4": "E"}}"#,
            4,
            &letters(),
        )
        .expect("valid reply");

        assert_eq!(reply.sheet_code, "A1B2C");
        assert_eq!(reply.answers.len(), 2);
        assert_eq!(reply.answers.get("1").map(String::as_str), Some("A"));
        assert_eq!(reply.answers.get("4").map(String::as_str), Some("E"));
    }

    #[test]
    fn missing_answers_mean_blank_sheet() {
        let reply = parse_reply(r#"{"sheet_code": "F00D1"}"#, 3, &letters()).expect("valid");
        assert!(reply.answers.is_empty());
    }

    #[test]
    fn non_json_keeps_raw_text() {
        let err = parse_reply("Sorry, I can't read that.", 3, &letters()).unwrap_err();
        assert!(matches!(err, AiReadError::NotJson { .. }));
        assert_eq!(err.raw_response(), Some("Sorry, I can't read that."));
    }

    #[test]
    fn rejects_contract_violations() {
        let cases = [
            r#"["A", "B"]"#,
            r#"{"answers": {"1": "A"}}"#,
            r#"{"sheet_code": "  ", "answers": {}}"#,
            r#"{"sheet_code": 12345, "answers": {}}"#,
            r#"{"sheet_code": "A1B2C", "answers": ["A"]}"#,
            r#"{"sheet_code": "A1B2C", "answers": {"1": 2}}"#,
            r#"{"sheet_code": "A1B2C", "answers": {"9": "A"}}"#,
            r#"{"sheet_code": "A1B2C", "answers": {"1": "Z"}}"#,
        ];

        for raw in cases {
            let err = parse_reply(raw, 4, &letters()).unwrap_err();
            assert!(
                matches!(err, AiReadError::InvalidShape { .. }),
                "expected shape error for {raw}"
            );
            assert_eq!(err.raw_response(), Some(raw));
        }
    }

    #[test]
    fn prompt_lists_exam_options() {
        let request = SheetReadRequest {
            image_base64: String::new(),
            num_questions: 10,
            option_letters: option_letters(3),
        };
        let prompt = user_prompt(&request);
        assert!(prompt.contains("10 questions"));
        assert!(prompt.contains("A, B, C"));
    }
}
