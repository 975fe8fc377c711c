use anyhow::{bail, Context, Result};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::config::TranscriptionConfig;

pub mod assembly_api;
pub mod openai_api;

pub use assembly_api::AssemblyAIProvider;
pub use openai_api::OpenAIProvider;

/// Speech-to-text backend operating on a local audio file.
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// False when the provider cannot possibly succeed, e.g. a blank API key.
    fn is_available(&self) -> bool;

    /// `language` is an ISO code, or empty / `auto` for detection.
    fn transcribe<'a>(
        &'a self,
        audio_path: &'a Path,
        language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

pub fn build_provider(config: &TranscriptionConfig) -> Result<Box<dyn TranscriptionProvider>> {
    let provider: Box<dyn TranscriptionProvider> = match config.provider.as_str() {
        "assembly-ai" => {
            let api_key = config
                .api_key
                .clone()
                .context("api_key is required for AssemblyAI provider")?;
            Box::new(AssemblyAIProvider::new(
                api_key,
                config.api_endpoint.clone(),
                config.timeout(),
            )?)
        }
        "openai-api" => {
            let api_key = config
                .api_key
                .clone()
                .context("api_key is required for OpenAI API provider")?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| "whisper-1".to_string());
            Box::new(OpenAIProvider::new(
                api_key,
                config.api_endpoint.clone(),
                model,
            )?)
        }
        other => bail!(
            "Unknown transcription provider '{}'. Supported providers: assembly-ai, openai-api",
            other
        ),
    };
    Ok(provider)
}
