//! Generic claim → execute → commit-or-fail wrapper shared by both stages.
//!
//! Invocations arrive at least once, possibly concurrently, with no shared
//! memory between them. Mutual exclusion comes only from the store's
//! compare-and-swap on the expected prior status:
//!
//! 1. Read the record. Not in the stage's precondition status: benign no-op.
//! 2. Claim: CAS precondition → in-progress, bumping the stage's attempt
//!    counter. Losing the CAS is a benign no-op (another invocation won).
//! 3. Run the stage's work on the claimed snapshot.
//! 4. Commit: CAS in-progress → completion with the stage output, or on
//!    failure back to the precondition status (retry) or to FAILED once the
//!    retry budget is spent. The commit is also fenced on the claim's
//!    `updated_at`, so a claim that was reclaimed and re-claimed meanwhile
//!    is not ours to commit.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;

use super::record::{FieldChange, JobId, JobRecord, JobUpdate, MeetingSummary, NewJob};
use super::status::{JobStatus, Stage};
use super::store::{JobStore, StoreError};

/// Faults the executor surfaces to its caller. Benign conditions are
/// reported as [`StageOutcome::Skipped`] instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Job record '{job_id}' not found for stage {stage}")]
    RecordNotFound { job_id: JobId, stage: Stage },

    #[error("Stage {stage} produced output for another stage")]
    OutputMismatch { stage: Stage },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a stage's work did not succeed. Both variants take the retry path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    #[error("{collaborator} timed out after {seconds}s")]
    CollaboratorTimeout {
        collaborator: &'static str,
        seconds: u64,
    },

    #[error("{collaborator} failed: {message}")]
    CollaboratorError {
        collaborator: &'static str,
        message: String,
    },
}

impl StageFailure {
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::CollaboratorError {
            collaborator,
            message: message.into(),
        }
    }
}

/// The partial update a stage's work produces.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Transcript(String),
    Summary(MeetingSummary),
}

impl StageOutput {
    fn stage(&self) -> Stage {
        match self {
            Self::Transcript(_) => Stage::Transcribe,
            Self::Summary(_) => Stage::Summarize,
        }
    }
}

/// Why an invocation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// The record was not in the stage's precondition status.
    PreconditionNotMet { status: JobStatus },
    /// Another invocation claimed the record first.
    ClaimConflict,
    /// The claim was taken away (stale reclaim or re-drive) before commit.
    ClaimLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Work succeeded and the record advanced to the stage's completion status.
    Completed(JobRecord),
    /// Work failed; the record went back to the precondition status and a
    /// later trigger may re-claim it.
    Retrying {
        record: JobRecord,
        attempt: u32,
        retry_after: Duration,
    },
    /// Retry budget exhausted; the record is FAILED with `last_error` set.
    Exhausted(JobRecord),
    Skipped(NoOpReason),
}

/// Run a collaborator call under a deadline, mapping both the timeout and
/// the call's own error into a [`StageFailure`].
pub async fn bounded<T, F>(
    collaborator: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, StageFailure>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StageFailure::collaborator(collaborator, format!("{:#}", e))),
        Err(_) => Err(StageFailure::CollaboratorTimeout {
            collaborator,
            seconds: limit.as_secs(),
        }),
    }
}

#[derive(Clone)]
pub struct StageExecutor {
    store: Arc<dyn JobStore>,
    config: PipelineConfig,
}

impl StageExecutor {
    pub fn new(store: Arc<dyn JobStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Create the PENDING record for a first-seen job.
    pub async fn ensure_record(
        &self,
        job_id: &JobId,
        job: &NewJob,
    ) -> Result<JobRecord, PipelineError> {
        let (record, created) = self.store.create_if_absent(job_id, job).await?;
        if created {
            info!(job_id = %job_id, source = %job.source_ref, "Created job record");
        }
        Ok(record)
    }

    pub async fn run_stage<F, Fut>(
        &self,
        job_id: &JobId,
        stage: Stage,
        work: F,
    ) -> Result<StageOutcome, PipelineError>
    where
        F: FnOnce(JobRecord) -> Fut,
        Fut: Future<Output = Result<StageOutput, StageFailure>>,
    {
        let Some(record) = self.store.get(job_id).await? else {
            error!(job_id = %job_id, stage = %stage, "Job record not found");
            return Err(PipelineError::RecordNotFound {
                job_id: job_id.clone(),
                stage,
            });
        };

        let precondition = stage.precondition();
        if record.status != precondition {
            debug!(
                job_id = %job_id,
                stage = %stage,
                status = %record.status,
                "Precondition not met, nothing to do"
            );
            return Ok(StageOutcome::Skipped(NoOpReason::PreconditionNotMet {
                status: record.status,
            }));
        }

        let claim = JobUpdate::to(stage.in_progress()).increment_attempts(stage);
        let Some(claimed) = self
            .store
            .compare_and_update(job_id, precondition, &claim)
            .await?
        else {
            debug!(job_id = %job_id, stage = %stage, "Lost claim race, nothing to do");
            return Ok(StageOutcome::Skipped(NoOpReason::ClaimConflict));
        };

        let attempt = claimed.attempts(stage);
        // Every store write bumps `updated_at`, so it identifies this claim.
        let fence = claimed.updated_at;
        info!(job_id = %job_id, stage = %stage, attempt, "Claimed job");

        match work(claimed).await {
            Ok(output) => self.commit_success(job_id, stage, fence, output).await,
            Err(failure) => {
                self.commit_failure(job_id, stage, fence, attempt, failure)
                    .await
            }
        }
    }

    async fn commit_success(
        &self,
        job_id: &JobId,
        stage: Stage,
        fence: DateTime<Utc>,
        output: StageOutput,
    ) -> Result<StageOutcome, PipelineError> {
        if output.stage() != stage {
            error!(job_id = %job_id, stage = %stage, "Stage produced foreign output");
            return Err(PipelineError::OutputMismatch { stage });
        }

        let mut update = JobUpdate::to(stage.completion())
            .last_error(FieldChange::Clear)
            .failed_stage(FieldChange::Clear)
            .if_updated_at(fence);
        update = match output {
            StageOutput::Transcript(text) => update.transcript(FieldChange::Set(text)),
            StageOutput::Summary(summary) => update.summary(FieldChange::Set(summary)),
        };

        match self
            .store
            .compare_and_update(job_id, stage.in_progress(), &update)
            .await?
        {
            Some(record) => {
                info!(job_id = %job_id, stage = %stage, status = %record.status, "Stage completed");
                Ok(StageOutcome::Completed(record))
            }
            None => {
                warn!(job_id = %job_id, stage = %stage, "Claim lost before commit, discarding result");
                Ok(StageOutcome::Skipped(NoOpReason::ClaimLost))
            }
        }
    }

    async fn commit_failure(
        &self,
        job_id: &JobId,
        stage: Stage,
        fence: DateTime<Utc>,
        attempt: u32,
        failure: StageFailure,
    ) -> Result<StageOutcome, PipelineError> {
        let message = failure.to_string();
        let exhausted = attempt >= self.config.retry_limit;

        let update = if exhausted {
            JobUpdate::to(JobStatus::Failed)
                .failed_stage(FieldChange::Set(stage))
                .last_error(FieldChange::Set(message.clone()))
        } else {
            JobUpdate::to(stage.precondition()).last_error(FieldChange::Set(message.clone()))
        }
        .if_updated_at(fence);

        let Some(record) = self
            .store
            .compare_and_update(job_id, stage.in_progress(), &update)
            .await?
        else {
            warn!(job_id = %job_id, stage = %stage, "Claim lost before recording failure");
            return Ok(StageOutcome::Skipped(NoOpReason::ClaimLost));
        };

        if exhausted {
            error!(
                job_id = %job_id,
                stage = %stage,
                attempt,
                error = %message,
                "Retry budget exhausted, job failed"
            );
            Ok(StageOutcome::Exhausted(record))
        } else {
            let retry_after = self.config.backoff(attempt);
            warn!(
                job_id = %job_id,
                stage = %stage,
                attempt,
                retry_after_secs = retry_after.as_secs(),
                error = %message,
                "Stage failed, will retry"
            );
            Ok(StageOutcome::Retrying {
                record,
                attempt,
                retry_after,
            })
        }
    }
}
