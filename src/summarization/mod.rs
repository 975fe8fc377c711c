//! Summarization stage: transcript → summary, decisions, action items.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::SummarizationConfig;
use crate::pipeline::{
    bounded, JobId, PipelineError, Stage, StageExecutor, StageFailure, StageOutcome, StageOutput,
};

mod parser;
mod prompt;
pub mod providers;

pub use parser::{SummaryError, SummaryParser};
pub use prompt::PromptSpec;
pub use providers::{build_provider, SummarizationProvider};

const COLLABORATOR: &str = "summarization";

#[derive(Clone)]
pub struct SummarizationStage {
    executor: StageExecutor,
    provider: Arc<dyn SummarizationProvider>,
    parser: Arc<SummaryParser>,
    prompt: Arc<PromptSpec>,
    timeout: Duration,
}

impl SummarizationStage {
    pub fn new(
        executor: StageExecutor,
        provider: Arc<dyn SummarizationProvider>,
        prompt: PromptSpec,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            executor,
            provider,
            parser: Arc::new(SummaryParser::new()?),
            prompt: Arc::new(prompt),
            timeout,
        })
    }

    pub fn from_config(
        executor: StageExecutor,
        provider: Arc<dyn SummarizationProvider>,
        config: &SummarizationConfig,
    ) -> Result<Self> {
        Self::new(executor, provider, config.prompt.clone(), config.timeout())
    }

    pub async fn handle(&self, job_id: &JobId) -> Result<StageOutcome, PipelineError> {
        let provider = Arc::clone(&self.provider);
        let parser = Arc::clone(&self.parser);
        let prompt = Arc::clone(&self.prompt);
        let timeout = self.timeout;

        self.executor
            .run_stage(job_id, Stage::Summarize, |record| async move {
                let transcript = record.transcript.as_deref().unwrap_or("").trim();
                if transcript.is_empty() {
                    return Err(StageFailure::collaborator(
                        COLLABORATOR,
                        "record has no transcript to summarize",
                    ));
                }

                let raw = bounded(
                    COLLABORATOR,
                    timeout,
                    provider.summarize(transcript, &prompt),
                )
                .await?;

                let summary = parser.parse(&raw).map_err(|e| {
                    debug!(job_id = %record.job_id, "Rejected summary response: {}", raw);
                    StageFailure::collaborator(COLLABORATOR, format!("invalid response: {}", e))
                })?;
                Ok(StageOutput::Summary(summary))
            })
            .await
    }
}
