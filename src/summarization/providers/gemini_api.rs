use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::SummarizationProvider;
use crate::summarization::PromptSpec;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    status: Option<String>,
}

/// Google Gemini `generateContent` with a JSON response MIME type.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, endpoint: Option<String>, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::new();
        let base_url = endpoint.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        info!(
            "Initialized Gemini provider with base URL: {} (model {})",
            base_url, model
        );

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

fn request<'a>(system: &'a str, user: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part { text: system }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: user }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            temperature: 0.2,
        },
    }
}

fn response_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl SummarizationProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini API"
    }

    async fn summarize(&self, transcript: &str, prompt: &PromptSpec) -> Result<String> {
        let system = prompt.render();
        let user = PromptSpec::source_text(transcript);

        debug!(
            "Sending {} transcript chars to Gemini model {}",
            transcript.len(),
            self.model
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request(&system, &user))
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            error!("Gemini request failed with status {}: {}", status, body);

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow::anyhow!(
                    "Gemini API error: {} (status: {:?})",
                    error_response.error.message,
                    error_response.error.status
                ));
            }

            return Err(anyhow::anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                body
            ));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse Gemini response")?;

        response_text(parsed).context("Gemini response contained no candidate text")
    }
}
