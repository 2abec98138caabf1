//! OpenAI-compatible chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, TextGenerator};
use crate::error::GenerationError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpGeneratorConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`. `/chat/completions` is appended.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

pub struct HttpGenerator {
    client: Client,
    config: HttpGeneratorConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl HttpGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GenerationError::ModelUnavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn map_send_error(&self, error: reqwest::Error) -> GenerationError {
        if error.is_timeout() {
            GenerationError::Timeout(self.config.request_timeout)
        } else if error.is_connect() {
            GenerationError::ModelUnavailable(format!("connection error: {error}"))
        } else {
            GenerationError::ModelUnavailable(format!("HTTP error: {error}"))
        }
    }
}

/// Map a non-success HTTP status to a generation failure.
pub(crate) fn status_error(status: StatusCode, body: &str) -> GenerationError {
    match status.as_u16() {
        400 if body.contains("content_filter") => GenerationError::PolicyRefused,
        401 | 403 => GenerationError::ModelUnavailable(format!("authentication failed: {body}")),
        404 => GenerationError::ModelUnavailable(format!("model not found: {body}")),
        429 => GenerationError::ModelUnavailable(format!("rate limit exceeded: {body}")),
        _ => GenerationError::ModelUnavailable(format!("request failed with status {status}: {body}")),
    }
}

/// Pull the text out of a completion, surfacing refusals and filter stops.
pub(crate) fn completion_text(response: ChatResponse) -> Result<String, GenerationError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedOutput("no choices in response".to_owned()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(GenerationError::PolicyRefused);
    }
    if let Some(reason) = choice.message.refusal {
        let reason = reason.trim();
        return Err(GenerationError::Refusal(
            (!reason.is_empty()).then(|| reason.to_owned()),
        ));
    }

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(GenerationError::MalformedOutput("empty completion".to_owned())),
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.7,
        };

        let mut builder = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, kind = ?request.kind, "generation request rejected");
            return Err(status_error(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedOutput(format!("invalid response body: {e}")))?;

        completion_text(parsed)
    }
}
