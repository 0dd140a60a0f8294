//! `ai-smoke`: asks Gemini or Groq for a handful of multiple-choice questions
//! and checks that what comes back would pass the question-bank form.

use std::env;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::api::models::QuestionDraft;
use crate::pages::admin::validate_question;

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AiProvider {
    Gemini,
    Groq,
}

impl AiProvider {
    pub fn key_var(self) -> &'static str {
        match self {
            AiProvider::Gemini => "GEMINI_API_KEY",
            AiProvider::Groq => "GROQ_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            AiProvider::Gemini => "gemini-1.5-flash",
            AiProvider::Groq => "llama-3.1-8b-instant",
        }
    }
}

#[derive(Debug, Error)]
pub enum AiSmokeError {
    #[error("{0} not set. Export it or pass via environment.")]
    MissingKey(&'static str),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider:?} API error {status}: {body}")]
    Api { provider: AiProvider, status: u16, body: String },
    #[error("response has no generated text")]
    EmptyCompletion,
    #[error("generated text is not a question list: {0}")]
    Malformed(String),
}

/// Question shape the prompt asks the model to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    #[serde(alias = "question")]
    pub content: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(alias = "answer", alias = "correctIndex")]
    pub correct_answer: Option<usize>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl GeneratedQuestion {
    pub fn to_draft(&self, subject: &str) -> QuestionDraft {
        QuestionDraft {
            content: self.content.clone(),
            options: self.options.clone(),
            correct_answer: self.correct_answer,
            difficulty: self.difficulty.clone(),
            subject: Some(subject.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct SmokeReport {
    pub accepted: Vec<GeneratedQuestion>,
    pub rejected: Vec<(GeneratedQuestion, String)>,
}

impl SmokeReport {
    pub fn passed(&self) -> bool {
        !self.accepted.is_empty() && self.rejected.is_empty()
    }
}

pub fn build_prompt(subject: &str, count: usize) -> String {
    format!(
        "Tạo {count} câu hỏi trắc nghiệm môn {subject}. Trả về duy nhất một mảng JSON, \
         mỗi phần tử có dạng {{\"content\": string, \"options\": [4 string], \
         \"correctAnswer\": số thứ tự đáp án đúng bắt đầu từ 0, \"difficulty\": \"easy\"|\"medium\"|\"hard\"}}."
    )
}

pub struct AiSmoke {
    client: Client,
    provider: AiProvider,
    model: String,
    api_key: String,
}

impl AiSmoke {
    pub fn from_env(provider: AiProvider, model: Option<String>) -> Result<Self, AiSmokeError> {
        let api_key = env::var(provider.key_var())
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AiSmokeError::MissingKey(provider.key_var()))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            provider,
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            api_key,
        })
    }

    pub async fn run(&self, subject: &str, count: usize) -> Result<SmokeReport, AiSmokeError> {
        let prompt = build_prompt(subject, count);
        log::info!("ai-smoke: {:?}/{} for {count} {subject} question(s)", self.provider, self.model);
        let response = match self.provider {
            AiProvider::Gemini => {
                self.client
                    .post(format!("{GEMINI_URL}/{}:generateContent", self.model))
                    .query(&[("key", self.api_key.as_str())])
                    .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
                    .send()
                    .await?
            }
            AiProvider::Groq => {
                self.client
                    .post(GROQ_URL)
                    .bearer_auth(&self.api_key)
                    .json(&json!({
                        "model": self.model,
                        "messages": [{ "role": "user", "content": prompt }],
                        "temperature": 0.4,
                    }))
                    .send()
                    .await?
            }
        };

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AiSmokeError::Api { provider: self.provider, status: status.as_u16(), body });
        }
        let value: Value = serde_json::from_str(&body).map_err(|e| AiSmokeError::Malformed(e.to_string()))?;
        let text = completion_text(self.provider, &value).ok_or(AiSmokeError::EmptyCompletion)?;
        let questions = parse_questions(&text)?;
        Ok(check_questions(questions, subject))
    }
}

/// Pulls the generated text out of a provider response body.
pub fn completion_text(provider: AiProvider, body: &Value) -> Option<String> {
    let text = match provider {
        AiProvider::Gemini => body
            .pointer("/candidates/0/content/parts")?
            .as_array()?
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<String>(),
        AiProvider::Groq => body.pointer("/choices/0/message/content")?.as_str()?.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}

/// Parses the model output, tolerating markdown fences and chatter around the array.
pub fn parse_questions(text: &str) -> Result<Vec<GeneratedQuestion>, AiSmokeError> {
    let start = text.find('[');
    let end = text.rfind(']');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &text[s..=e],
        _ => return Err(AiSmokeError::Malformed("no JSON array found".into())),
    };
    serde_json::from_str(slice).map_err(|e| AiSmokeError::Malformed(e.to_string()))
}

pub fn check_questions(questions: Vec<GeneratedQuestion>, subject: &str) -> SmokeReport {
    let mut report = SmokeReport::default();
    for q in questions {
        match validate_question(&q.to_draft(subject)) {
            Ok(()) => report.accepted.push(q),
            Err(e) => report.rejected.push((q, e.to_string())),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_both_providers() {
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "[1"}, {"text": "]"}]}}]});
        assert_eq!(completion_text(AiProvider::Gemini, &gemini).as_deref(), Some("[1]"));
        let groq = json!({"choices": [{"message": {"role": "assistant", "content": "[]"}}]});
        assert_eq!(completion_text(AiProvider::Groq, &groq).as_deref(), Some("[]"));
        assert!(completion_text(AiProvider::Groq, &json!({"choices": []})).is_none());
    }

    #[test]
    fn parses_fenced_output_and_flags_bad_questions() {
        let text = "Đây là kết quả:\n```json\n[\
            {\"content\": \"1 + 1 = ?\", \"options\": [\"1\", \"2\", \"3\", \"4\"], \"correctAnswer\": 1},\
            {\"question\": \"Thủ đô?\", \"options\": [\"Hà Nội\"], \"answer\": 0}\
        ]\n```";
        let qs = parse_questions(text).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].content, "Thủ đô?");
        let report = check_questions(qs, "Toán");
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert!(!report.passed());
    }

    #[test]
    fn no_array_is_malformed() {
        assert!(matches!(parse_questions("xin lỗi"), Err(AiSmokeError::Malformed(_))));
    }
}
