//! Transcription stage: deposited media → transcript.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, TranscriptionConfig};
use crate::pipeline::{
    bounded, JobId, NewJob, PipelineError, SourceRef, Stage, StageExecutor, StageFailure,
    StageOutcome, StageOutput,
};

pub mod media;
pub mod providers;

pub use media::MediaStore;
pub use providers::{build_provider, TranscriptionProvider};

const COLLABORATOR: &str = "transcription";

/// `(source_ref) -> text`. Everything between the stored object and the
/// returned text (download, audio extraction, the speech engine) lives
/// behind this trait.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, source: &SourceRef, content_type: Option<&str>) -> Result<String>;
}

/// Resolves the object from local storage and runs it through a provider.
pub struct MediaTranscriber {
    media: MediaStore,
    provider: Box<dyn TranscriptionProvider>,
    language: String,
}

impl MediaTranscriber {
    pub fn new(media: MediaStore, provider: Box<dyn TranscriptionProvider>, language: String) -> Self {
        Self {
            media,
            provider,
            language,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = build_provider(&config.transcription)?;
        if !provider.is_available() {
            bail!(
                "{} is not usable; check transcription.api_key",
                provider.name()
            );
        }
        info!("Using {} for transcription", provider.name());
        Ok(Self::new(
            MediaStore::new(config.storage_root()?),
            provider,
            language(&config.transcription),
        ))
    }
}

fn language(config: &TranscriptionConfig) -> String {
    config.language.clone().unwrap_or_else(|| "auto".to_string())
}

#[async_trait]
impl Transcriber for MediaTranscriber {
    async fn transcribe(&self, source: &SourceRef, content_type: Option<&str>) -> Result<String> {
        let path = self.media.resolve(source)?;
        let audio = media::prepare_audio(&path, content_type).await?;
        debug!(
            "Transcribing {} from {:?} with {}",
            source,
            audio.path(),
            self.provider.name()
        );
        self.provider
            .transcribe(audio.path(), &self.language)
            .await
            .with_context(|| format!("{} failed for {}", self.provider.name(), source))
    }
}

#[derive(Clone)]
pub struct TranscriptionStage {
    executor: StageExecutor,
    transcriber: Arc<dyn Transcriber>,
    timeout: Duration,
}

impl TranscriptionStage {
    pub fn new(executor: StageExecutor, transcriber: Arc<dyn Transcriber>, timeout: Duration) -> Self {
        Self {
            executor,
            transcriber,
            timeout,
        }
    }

    /// Create the record on first sight, then run the stage. Duplicate
    /// deposits land on the same `job_id` and fall out as no-ops.
    pub async fn handle(&self, job: &NewJob) -> Result<(JobId, StageOutcome), PipelineError> {
        let job_id = job.source_ref.job_id();
        self.executor.ensure_record(&job_id, job).await?;

        let transcriber = Arc::clone(&self.transcriber);
        let timeout = self.timeout;
        let outcome = self
            .executor
            .run_stage(&job_id, Stage::Transcribe, |record| async move {
                let text = bounded(
                    COLLABORATOR,
                    timeout,
                    transcriber.transcribe(&record.source_ref, record.content_type.as_deref()),
                )
                .await?;

                let text = text.trim();
                if text.is_empty() {
                    return Err(StageFailure::collaborator(
                        COLLABORATOR,
                        "returned an empty transcript",
                    ));
                }
                Ok(StageOutput::Transcript(text.to_string()))
            })
            .await?;

        Ok((job_id, outcome))
    }
}
