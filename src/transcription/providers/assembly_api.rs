use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::TranscriptionProvider;

const FIRST_POLL_DELAY: Duration = Duration::from_secs(1);
const MAX_POLL_DELAY: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Upload {
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct Submission<'a> {
    audio_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    language_detection: bool,
}

#[derive(Debug, Deserialize)]
struct Transcript {
    id: String,
    status: Progress,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum Progress {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Deserialize)]
struct ApiFault {
    error: String,
}

/// AssemblyAI upload → submit → poll, bounded by one overall deadline so a
/// slow job gives up before the stage timeout instead of after it.
pub struct AssemblyAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    deadline: Duration,
}

impl AssemblyAIProvider {
    pub fn new(api_key: String, endpoint: Option<String>, deadline: Duration) -> Result<Self> {
        let base_url = endpoint
            .unwrap_or_else(|| "https://api.assemblyai.com/v2".to_string())
            .trim_end_matches('/')
            .to_string();

        info!(
            "Initialized AssemblyAI provider with base URL: {} (deadline {}s)",
            base_url,
            deadline.as_secs()
        );

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            deadline,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", &self.api_key)
    }

    /// Send, check the status, and decode the body; `what` names the call in errors.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("AssemblyAI {} request failed", what))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read AssemblyAI {} response", what))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiFault>(&body)
                .map(|fault| fault.error)
                .unwrap_or(body);
            bail!("AssemblyAI {} returned {}: {}", what, status, detail);
        }

        serde_json::from_str(&body)
            .with_context(|| format!("Unexpected AssemblyAI {} response", what))
    }

    async fn run(&self, audio_path: &Path, language: &str) -> Result<String> {
        let started = Instant::now();
        let give_up_at = started + self.deadline;

        let audio = tokio::fs::read(audio_path)
            .await
            .with_context(|| format!("Failed to read audio file {:?}", audio_path))?;
        let upload: Upload = self
            .call(
                self.request(Method::POST, "/upload")
                    .header("Content-Type", "application/octet-stream")
                    .body(audio),
                "upload",
            )
            .await?;

        let language_code = language_code(language);
        let submitted: Transcript = self
            .call(
                self.request(Method::POST, "/transcript").json(&Submission {
                    audio_url: &upload.upload_url,
                    language_code,
                    language_detection: language_code.is_none(),
                }),
                "submit",
            )
            .await?;
        debug!("AssemblyAI transcript {} submitted", submitted.id);

        let poll_path = format!("/transcript/{}", submitted.id);
        let mut current = submitted;
        let mut delay = FIRST_POLL_DELAY;
        loop {
            if let Some(text) = settled(&current)? {
                info!(
                    "AssemblyAI transcript {} ready after {}s ({} chars)",
                    current.id,
                    started.elapsed().as_secs(),
                    text.len()
                );
                return Ok(text);
            }

            let now = Instant::now();
            if now + delay >= give_up_at {
                warn!("Giving up on AssemblyAI transcript {}", current.id);
                bail!(
                    "AssemblyAI transcript {} still {:?} after {}s",
                    current.id,
                    current.status,
                    self.deadline.as_secs()
                );
            }
            tokio::time::sleep(delay).await;
            delay = next_delay(delay);

            current = self.call(self.request(Method::GET, &poll_path), "poll").await?;
        }
    }
}

/// `Some(text)` once finished, `None` while queued or processing.
fn settled(transcript: &Transcript) -> Result<Option<String>> {
    match transcript.status {
        Progress::Completed => Ok(Some(
            transcript.text.as_deref().unwrap_or_default().trim().to_string(),
        )),
        Progress::Error => Err(anyhow!(
            "AssemblyAI transcript {} failed: {}",
            transcript.id,
            transcript.error.as_deref().unwrap_or("no reason given")
        )),
        Progress::Queued | Progress::Processing => Ok(None),
    }
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_POLL_DELAY)
}

fn language_code(language: &str) -> Option<&str> {
    let language = language.trim();
    if language.is_empty() || language.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(language)
    }
}

impl TranscriptionProvider for AssemblyAIProvider {
    fn name(&self) -> &'static str {
        "AssemblyAI API"
    }

    fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn transcribe<'a>(
        &'a self,
        audio_path: &'a Path,
        language: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.run(audio_path, language))
    }
}
