use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, error, info};

use super::TranscriptionProvider;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
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

/// OpenAI `/audio/transcriptions` (Whisper) over multipart upload.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String, endpoint: Option<String>, model: String) -> Result<Self> {
        let client = reqwest::Client::new();
        let endpoint = endpoint
            .unwrap_or_else(|| "https://api.openai.com/v1/audio/transcriptions".to_string());

        info!(
            "Initialized OpenAI Whisper provider with endpoint: {} (model {})",
            endpoint, model
        );

        Ok(Self {
            client,
            api_key,
            endpoint,
            model,
        })
    }

    fn form(&self, file_name: String, audio: Vec<u8>, language: &str) -> Result<Form> {
        let part = Part::bytes(audio)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .context("Failed to build multipart body")?;

        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);

        let language = language.trim();
        if !language.is_empty() && !language.eq_ignore_ascii_case("auto") {
            form = form.text("language", language.to_string());
        }
        Ok(form)
    }
}

impl TranscriptionProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "OpenAI Whisper API"
    }

    fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn transcribe<'a>(
        &'a self,
        audio_path: &'a Path,
        language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            info!("Transcribing audio file via OpenAI API: {:?}", audio_path);

            let audio = tokio::fs::read(audio_path)
                .await
                .context("Failed to read audio file")?;
            let file_name = audio_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("audio.wav")
                .to_string();

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .multipart(self.form(file_name, audio, language)?)
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
                    "OpenAI API request failed with status {}: {}",
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
                    "OpenAI API request failed with status {}: {}",
                    status,
                    response_text
                ));
            }

            let transcription: TranscriptionResponse = serde_json::from_str(&response_text)
                .context("Failed to parse transcription response")?;

            let text = transcription.text.trim().to_string();
            info!("Transcription complete: {} chars", text.len());
            debug!("Raw transcription: {}", text);

            Ok(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let provider = OpenAIProvider::new("sk".to_string(), None, "whisper-1".to_string()).unwrap();
        assert_eq!(
            provider.endpoint,
            "https://api.openai.com/v1/audio/transcriptions"
        );
        assert!(provider.is_available());
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"error":{"message":"Invalid file format.","type":"invalid_request_error"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "Invalid file format.");
        assert_eq!(parsed.error.r#type.as_deref(), Some("invalid_request_error"));
    }
}
