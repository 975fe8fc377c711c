//! Operator re-drive and stale-claim reclaim.
//!
//! Both reset a record to an earlier status through the same conditional
//! update the stages use, guarded on `updated_at` so a concurrent commit
//! always wins over the reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PipelineConfig;

use super::record::{FieldChange, JobId, JobRecord, JobUpdate};
use super::status::{JobStatus, Stage};
use super::store::{JobFilter, JobStore, StoreError};

const RECLAIM_BATCH: usize = 500;

/// Where a FAILED record restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedriveTarget {
    /// Full restart: transcribe again.
    Pending,
    /// Keep the transcript, summarize again.
    Transcribed,
}

impl RedriveTarget {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Pending,
            Self::Transcribed => JobStatus::Transcribed,
        }
    }
}

impl fmt::Display for RedriveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Transcribed => "transcribed",
        })
    }
}

impl FromStr for RedriveTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" | "transcribe" => Ok(Self::Pending),
            "transcribed" | "summarize" => Ok(Self::Transcribed),
            other => Err(format!(
                "Unknown re-drive target '{}'. Expected 'pending' or 'transcribed'",
                other
            )),
        }
    }
}

#[derive(Error, Debug)]
pub enum RedriveError {
    #[error("Job '{0}' not found")]
    NotFound(JobId),

    #[error("Job '{job_id}' is {status}; only FAILED jobs can be re-driven")]
    NotFailed { job_id: JobId, status: JobStatus },

    #[error("Job '{0}' has no transcript; re-drive it to pending instead")]
    MissingTranscript(JobId),

    #[error("Job '{0}' changed while re-driving; try again")]
    Conflict(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reset a FAILED record so the pipeline picks it up again.
pub async fn redrive(
    store: &dyn JobStore,
    job_id: &JobId,
    target: RedriveTarget,
) -> Result<JobRecord, RedriveError> {
    let record = store
        .get(job_id)
        .await?
        .ok_or_else(|| RedriveError::NotFound(job_id.clone()))?;

    if !record.status.can_redrive_to(target.status()) {
        return Err(RedriveError::NotFailed {
            job_id: job_id.clone(),
            status: record.status,
        });
    }

    let update = match target {
        RedriveTarget::Pending => JobUpdate::to(JobStatus::Pending)
            .transcript(FieldChange::Clear)
            .summary(FieldChange::Clear)
            .reset_attempts(Stage::Transcribe)
            .reset_attempts(Stage::Summarize),
        RedriveTarget::Transcribed => {
            if record.transcript.is_none() {
                return Err(RedriveError::MissingTranscript(job_id.clone()));
            }
            JobUpdate::to(JobStatus::Transcribed)
                .summary(FieldChange::Clear)
                .reset_attempts(Stage::Summarize)
        }
    }
    .failed_stage(FieldChange::Clear)
    .last_error(FieldChange::Clear)
    .if_updated_at(record.updated_at);

    let redriven = store
        .compare_and_update(job_id, JobStatus::Failed, &update)
        .await?
        .ok_or_else(|| RedriveError::Conflict(job_id.clone()))?;

    info!(job_id = %job_id, target = %target, "Re-drove failed job");
    Ok(redriven)
}

/// Return abandoned claims to their pre-claim status, or to FAILED when the
/// stage has no attempts left. A claim is abandoned once its `updated_at` is
/// older than `stale_after` relative to `now`.
pub async fn reclaim_stale(
    store: &dyn JobStore,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<Vec<JobRecord>, StoreError> {
    let Some(cutoff) = chrono::Duration::from_std(config.stale_after())
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
    else {
        return Ok(Vec::new());
    };

    let mut reclaimed = Vec::new();
    for status in [JobStatus::Transcribing, JobStatus::Summarizing] {
        let Some(stage) = status.in_progress_stage() else {
            continue;
        };
        let filter = JobFilter::default()
            .with_status(status)
            .updated_before(cutoff)
            .with_limit(RECLAIM_BATCH);

        for record in store.list(&filter).await? {
            let attempts = record.attempts(stage);
            let message = format!(
                "{} claim abandoned on attempt {} (idle since {})",
                stage,
                attempts,
                record.updated_at.to_rfc3339()
            );
            let update = if attempts >= config.retry_limit {
                JobUpdate::to(JobStatus::Failed).failed_stage(FieldChange::Set(stage))
            } else {
                JobUpdate::to(stage.precondition())
            }
            .last_error(FieldChange::Set(message))
            .if_updated_at(record.updated_at);

            match store.compare_and_update(&record.job_id, status, &update).await? {
                Some(updated) => {
                    warn!(
                        job_id = %updated.job_id,
                        stage = %stage,
                        attempt = attempts,
                        status = %updated.status,
                        "Reclaimed stale claim"
                    );
                    reclaimed.push(updated);
                }
                None => {
                    // Committed or reclaimed by someone else meanwhile.
                }
            }
        }
    }

    Ok(reclaimed)
}
