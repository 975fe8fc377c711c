use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use super::PromptSpec;
use crate::config::SummarizationConfig;

pub mod gemini_api;
pub mod openai_chat;

pub use gemini_api::GeminiProvider;
pub use openai_chat::OpenAIChatProvider;

/// `(text, prompt) -> raw model response`. Validation of the response is
/// the stage's job, not the provider's.
#[async_trait]
pub trait SummarizationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, transcript: &str, prompt: &PromptSpec) -> Result<String>;
}

pub fn build_provider(config: &SummarizationConfig) -> Result<Box<dyn SummarizationProvider>> {
    let provider: Box<dyn SummarizationProvider> = match config.provider.as_str() {
        "openai-api" => {
            let api_key = config
                .api_key
                .clone()
                .context("api_key is required for OpenAI API provider")?;
            Box::new(OpenAIChatProvider::new(
                api_key,
                config.api_endpoint.clone(),
                config.model.clone(),
            )?)
        }
        "gemini" => {
            let api_key = config
                .api_key
                .clone()
                .context("api_key is required for Gemini provider")?;
            Box::new(GeminiProvider::new(
                api_key,
                config.api_endpoint.clone(),
                config.model.clone(),
            )?)
        }
        other => bail!(
            "Unknown summarization provider '{}'. Supported providers: openai-api, gemini",
            other
        ),
    };
    Ok(provider)
}
