use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::SummarizationProvider;
use crate::summarization::PromptSpec;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    r#type: Option<String>,
}

/// OpenAI-compatible chat completions in JSON mode.
pub struct OpenAIChatProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAIChatProvider {
    pub fn new(api_key: String, endpoint: Option<String>, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::new();
        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        info!(
            "Initialized OpenAI chat provider with endpoint: {} (model {})",
            endpoint, model
        );

        Ok(Self {
            client,
            api_key,
            endpoint,
            model,
        })
    }

    fn request<'a>(&'a self, system: &'a str, user: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                r#type: "json_object",
            },
            temperature: 0.2,
        }
    }
}

#[async_trait]
impl SummarizationProvider for OpenAIChatProvider {
    fn name(&self) -> &'static str {
        "OpenAI Chat API"
    }

    async fn summarize(&self, transcript: &str, prompt: &PromptSpec) -> Result<String> {
        let system = prompt.render();
        let user = PromptSpec::source_text(transcript);

        debug!(
            "Sending {} transcript chars to OpenAI chat model {}",
            transcript.len(),
            self.model
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(&system, &user))
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            error!(
                "OpenAI chat request failed with status {}: {}",
                status, response_text
            );

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&response_text) {
                return Err(anyhow::anyhow!(
                    "OpenAI API error: {} (type: {:?})",
                    error_response.error.message,
                    error_response.error.r#type
                ));
            }

            return Err(anyhow::anyhow!(
                "OpenAI chat request failed with status {}: {}",
                status,
                response_text
            ));
        }

        let chat: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("OpenAI chat response contained no message content")
    }
}
