use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MAX_OUTPUT_TOKENS: i32 = 512;
const API_KEY_HEADER: &str = "x-goog-api-key";

pub const NO_ANSWER_REPLY: &str = "Sorry, I couldn't find a meaningful answer in the PDF content.";
pub const GENERATOR_FAILURE_REPLY: &str = "Sorry, I couldn't process the query due to an API error.";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("request error: {0}")]
    Request(#[source] reqwest::Error),
    #[error("HTTP error: {status_code} - {message}")]
    Http { status_code: u16, message: String },
    #[error("response error: {0}")]
    Response(String),
}

impl From<reqwest::Error> for GeneratorError {
    fn from(err: reqwest::Error) -> Self {
        // The URL is left out of anything that may be logged.
        Self::Request(err.without_url())
    }
}

/// Produces an answer to `query` from retrieved document context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, context: &[&str]) -> Result<String, GeneratorError>;
}

pub fn build_prompt(query: &str, context: &[&str]) -> String {
    format!(
        "You are a helpful assistant answering questions based on a provided PDF document.\n\
         Use only the following context to generate a concise and accurate answer.\n\
         Do not use external knowledge or make up information. \
         If the context lacks sufficient information, say so clearly.\n\n\
         Context: {}\n\n\
         Question: {query}\n\n\
         Answer:",
        context.join(" ")
    )
}

/// Maps a raw generator result onto the reply shown to the user.
pub fn finalize_answer(result: Result<String, GeneratorError>) -> String {
    match result {
        Ok(answer) => {
            let answer = answer.trim();
            if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
                debug!("no meaningful answer found");
                NO_ANSWER_REPLY.to_string()
            } else {
                answer.to_string()
            }
        }
        Err(err) => {
            error!(error = %err, "answer generation failed");
            GENERATOR_FAILURE_REPLY.to_string()
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: i32,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<Content>,
}

/// Answers through the Gemini `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Points the client at another server, e.g. a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, query: &str, context: &[&str]) -> Result<String, GeneratorError> {
        debug!(model = %self.model, chunks = context.len(), "generating answer");
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_prompt(query, context)),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Http {
                status_code: status.as_u16(),
                message,
            });
        }

        let body: GenerateContentResponse = response.json().await?;
        body.candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .find_map(|part| part.text)
            .ok_or_else(|| GeneratorError::Response("no text in response".to_string()))
    }
}

/// Offline fallback: answers with the best matching chunk.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn generate(&self, _query: &str, context: &[&str]) -> Result<String, GeneratorError> {
        Ok(context.first().map(|chunk| chunk.to_string()).unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "tests/generator_tests.rs"]
mod tests;
